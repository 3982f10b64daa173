//! Zod validator emission.

use hookforge_core::{TypeKind, TypeTree};

use crate::{
    field_key, schema_const_name, CodegenError, CodegenResult,
    MAX_EMIT_DEPTH,
};

/// Emit the validator module for a kind.
pub fn validator_source(kind: &str, tree: &TypeTree) -> CodegenResult<String> {
    let body = emit(tree, 0)?;
    Ok(format!(
        "import {{ z }} from \"zod\";\n\nexport const {} = {};\n",
        schema_const_name(kind),
        body
    ))
}

/// Last-resort validator: accepts anything, stays syntactically valid.
pub fn degenerate_validator(kind: &str) -> String {
    format!(
        "import {{ z }} from \"zod\";\n\nexport const {} = z.unknown();\n",
        schema_const_name(kind)
    )
}

fn emit(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    if depth > MAX_EMIT_DEPTH {
        return Err(CodegenError::DepthExceeded(MAX_EMIT_DEPTH));
    }

    let rendered = match node.kind {
        TypeKind::String => annotate_string(node),
        TypeKind::Number => "z.number()".to_string(),
        TypeKind::Boolean => "z.boolean()".to_string(),
        TypeKind::Null => "z.null()".to_string(),
        TypeKind::Object => emit_object(node, depth)?,
        TypeKind::Array => emit_array(node, depth)?,
        TypeKind::Union => emit_union(node, depth)?,
    };
    Ok(rendered)
}

/// Redacted strings carry a human-readable annotation naming the inferred
/// original content.
fn annotate_string(node: &TypeTree) -> String {
    if node.redacted {
        let tag = node
            .redacted_original_kind
            .map(|t| t.as_str())
            .unwrap_or("text");
        format!(
            "z.string().describe(\"truncated; original looked like {tag}\")"
        )
    } else {
        "z.string()".to_string()
    }
}

fn emit_object(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    if node.children.is_empty() {
        return Ok("z.object({})".to_string());
    }

    let pad = "  ".repeat(depth + 1);
    let close_pad = "  ".repeat(depth);
    let mut lines = Vec::with_capacity(node.children.len());
    for (name, child) in &node.children {
        let mut rendered = emit(child, depth + 1)?;
        if child.optional {
            rendered.push_str(".optional()");
        }
        lines.push(format!("{pad}{}: {rendered},", field_key(name)));
    }
    Ok(format!(
        "z.object({{\n{}\n{close_pad}}})",
        lines.join("\n")
    ))
}

fn emit_array(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    match node.item_type.as_deref() {
        Some(item) => Ok(format!("z.array({})", emit(item, depth)?)),
        None => Ok("z.array(z.unknown())".to_string()),
    }
}

fn emit_union(node: &TypeTree, depth: usize) -> CodegenResult<String> {
    let mut variants = Vec::with_capacity(node.children.len());
    for child in node.children.values() {
        variants.push(emit(child, depth)?);
    }
    match variants.len() {
        0 => Ok("z.unknown()".to_string()),
        1 => Ok(variants.remove(0)),
        _ => Ok(format!("z.union([{}])", variants.join(", "))),
    }
}
