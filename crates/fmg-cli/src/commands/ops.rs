//! Ops command - list exposed operations

use fmg_ops::{Dispatcher, OperationInfo};
use serde::Serialize;
use tabled::Tabled;

use crate::output::OutputContext;

#[derive(Tabled, Serialize)]
pub struct OperationRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Mutating")]
    pub mutating: String,
    #[tabled(rename = "Parameters")]
    pub params: String,
    #[tabled(rename = "Description")]
    pub description: String,
}

impl From<&OperationInfo> for OperationRow {
    fn from(info: &OperationInfo) -> Self {
        let params = info
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("[{}]", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            name: info.name.to_string(),
            mutating: if info.mutating { "yes" } else { "no" }.to_string(),
            params,
            description: info.description.to_string(),
        }
    }
}

pub fn ops(dispatcher: &Dispatcher, ctx: &OutputContext) {
    let tools = dispatcher.tools();
    ctx.info(&format!(
        "{} tool(s) in {:?} mode",
        tools.len(),
        dispatcher.mode()
    ));

    let rows: Vec<OperationRow> = tools.iter().map(OperationRow::from).collect();
    ctx.print_rows(&rows);
}
