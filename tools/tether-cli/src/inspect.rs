//! Type-graph dumping.

use anyhow::Result;
use tether::graph::{TypeGraph, TypeKind};

use crate::cli::InspectArgs;

/// Prints the graph as a table or JSON.
pub fn dump(graph: &TypeGraph, args: &InspectArgs) -> Result<()> {
    match args.format.as_str() {
        "json" => dump_json(graph, args),
        "table" => {
            dump_table(graph, args);
            Ok(())
        }
        other => anyhow::bail!("unknown format: {other} (expected table or json)"),
    }
}

fn selected<'g>(
    graph: &'g TypeGraph,
    args: &'g InspectArgs,
) -> impl Iterator<Item = (&'g str, tether::TypeId)> {
    graph.names().filter(move |(name, _)| {
        args.filter
            .as_deref()
            .is_none_or(|needle| name.contains(needle))
    })
}

fn dump_table(graph: &TypeGraph, args: &InspectArgs) {
    println!("{:<40} {:<10} {:>8}  {}", "name", "kind", "size", "address");
    for (name, id) in selected(graph, args) {
        let node = graph.node(id);
        let address = match &node.kind {
            TypeKind::Variable { address, .. } | TypeKind::Function { address, .. } => {
                address.map_or("-".to_string(), |a| format!("0x{a:08x}"))
            }
            _ => "-".to_string(),
        };
        println!(
            "{:<40} {:<10} {:>8}  {}",
            name,
            node.kind.name(),
            node.size,
            address
        );
    }
    println!(
        "\n{} names, {} enumerators, {}-endian, {}-byte pointers",
        graph.names().count(),
        graph.enums.len(),
        match graph.endian {
            tether::graph::Endian::Little => "little",
            tether::graph::Endian::Big => "big",
        },
        graph.word_size
    );
}

fn dump_json(graph: &TypeGraph, args: &InspectArgs) -> Result<()> {
    let mut entries = Vec::new();
    for (name, id) in selected(graph, args) {
        let node = graph.node(id);
        let mut entry = serde_json::json!({
            "name": name,
            "kind": node.kind.name(),
            "size": node.size,
        });
        match &node.kind {
            TypeKind::Variable { address, data, .. } => {
                entry["address"] = serde_json::json!(address);
                entry["const_data"] = serde_json::json!(data.is_some());
            }
            TypeKind::Function {
                address, arguments, ..
            } => {
                entry["address"] = serde_json::json!(address);
                entry["arguments"] = serde_json::json!(
                    arguments
                        .iter()
                        .map(|&a| graph.node(a).typename.clone())
                        .collect::<Vec<_>>()
                );
            }
            TypeKind::Struct { members } | TypeKind::Union { members } => {
                entry["members"] = serde_json::json!(
                    members
                        .iter()
                        .map(|m| {
                            serde_json::json!({
                                "name": m.name,
                                "offset": m.offset,
                                "type": graph.node(m.ty).typename,
                            })
                        })
                        .collect::<Vec<_>>()
                );
            }
            _ => {}
        }
        entries.push(entry);
    }
    let doc = serde_json::json!({
        "word_size": graph.word_size,
        "enums": graph.enums,
        "types": entries,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
