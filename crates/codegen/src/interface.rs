//! TypeScript interface emission.

use hookforge_core::{TypeKind, TypeTree};

use crate::{
    field_key, type_identifier, CodegenError, CodegenResult, MAX_EMIT_DEPTH,
};

/// Emit the typed interface for a kind.
///
/// Non-object roots (rare, but a kind can be pinned to an array or scalar
/// payload) become a type alias instead of an interface.
pub fn interface_source(kind: &str, tree: &TypeTree) -> CodegenResult<String> {
    let ident = type_identifier(kind);
    if tree.kind == TypeKind::Object {
        let body = emit_object_body(tree, 0)?;
        Ok(format!("export interface {ident} {body}\n"))
    } else {
        let body = emit(tree, 0)?;
        Ok(format!("export type {ident} = {body};\n"))
    }
}

/// Last-resort any-shaped interface.
pub fn degenerate_interface(kind: &str) -> String {
    format!("export type {} = any;\n", type_identifier(kind))
}

fn emit(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    if depth > MAX_EMIT_DEPTH {
        return Err(CodegenError::DepthExceeded(MAX_EMIT_DEPTH));
    }

    Ok(match node.kind {
        TypeKind::String => "string".to_string(),
        TypeKind::Number => "number".to_string(),
        TypeKind::Boolean => "boolean".to_string(),
        TypeKind::Null => "null".to_string(),
        TypeKind::Object => emit_object_body(node, depth)?,
        TypeKind::Array => emit_array(node, depth)?,
        TypeKind::Union => emit_union(node, depth)?,
    })
}

fn emit_object_body(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    if node.children.is_empty() {
        return Ok("{}".to_string());
    }

    let pad = "  ".repeat(depth + 1);
    let close_pad = "  ".repeat(depth);
    let mut lines = Vec::with_capacity(node.children.len());
    for (name, child) in &node.children {
        let rendered = emit(child, depth + 1)?;
        let marker = if child.optional { "?" } else { "" };
        let mut line =
            format!("{pad}{}{marker}: {rendered};", field_key(name));
        if child.redacted {
            let tag = child
                .redacted_original_kind
                .map(|t| t.as_str())
                .unwrap_or("text");
            line.push_str(&format!(" // truncated {tag}"));
        }
        lines.push(line);
    }
    Ok(format!("{{\n{}\n{close_pad}}}", lines.join("\n")))
}

fn emit_array(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    match node.item_type.as_deref() {
        Some(item) => {
            let rendered = emit(item, depth)?;
            // Compound element types need parentheses before []
            if item.kind == TypeKind::Union || item.kind == TypeKind::Object {
                Ok(format!("Array<{rendered}>"))
            } else {
                Ok(format!("{rendered}[]"))
            }
        }
        None => Ok("unknown[]".to_string()),
    }
}

fn emit_union(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    let mut variants = Vec::with_capacity(node.children.len());
    for child in node.children.values() {
        variants.push(emit(child, depth)?);
    }
    match variants.len() {
        0 => Ok("unknown".to_string()),
        1 => Ok(variants.remove(0)),
        _ => Ok(variants.join(" | ")),
    }
}
