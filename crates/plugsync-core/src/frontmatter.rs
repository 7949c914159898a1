use serde_yaml::{Mapping, Value};

/// Maximum description length accepted by the target platform.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Normalize the leading `---` frontmatter block of a synced extension file
/// to the target platform's schema:
///
/// - `name` is forced to the mapped target name
/// - `description` is truncated to [`MAX_DESCRIPTION_LEN`] characters
/// - `tools` becomes an array (comma-separated scalars are split)
///
/// Content without a frontmatter block, or with one that fails to parse,
/// passes through unchanged.
pub fn normalize(content: &str, target_name: &str) -> String {
    let Some((block, rest)) = split_frontmatter(content) else {
        return content.to_string();
    };

    let mut mapping: Mapping = match serde_yaml::from_str(block) {
        Ok(Value::Mapping(m)) => m,
        Ok(_) | Err(_) => {
            tracing::debug!("leaving unparseable frontmatter untouched");
            return content.to_string();
        }
    };

    mapping.insert(
        Value::from("name"),
        Value::from(target_name),
    );

    if let Some(Value::String(desc)) = mapping.get(Value::from("description")).cloned() {
        let truncated: String = desc.chars().take(MAX_DESCRIPTION_LEN).collect();
        mapping.insert(Value::from("description"), Value::from(truncated));
    }

    if let Some(tools) = mapping.get(Value::from("tools")).cloned() {
        mapping.insert(Value::from("tools"), normalize_tools(tools));
    }

    let yaml = match serde_yaml::to_string(&mapping) {
        Ok(y) => y,
        Err(_) => return content.to_string(),
    };
    format!("---\n{yaml}---\n{rest}")
}

/// Split `content` into its frontmatter block body and the remainder.
/// Returns `None` when there is no leading `---` delimited block.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let after_open = content.strip_prefix("---\n")?;
    let close = after_open.find("\n---")?;
    let block = &after_open[..close + 1];
    let mut rest = &after_open[close + 4..];
    if let Some(r) = rest.strip_prefix('\n') {
        rest = r;
    }
    Some((block, rest))
}

/// Tool lists arrive as either a scalar (`tools: Read, Write`) or an array;
/// the target schema wants an array.
fn normalize_tools(tools: Value) -> Value {
    match tools {
        Value::String(s) => Value::Sequence(
            s.split(',')
                .map(|t| Value::from(t.trim()))
                .filter(|t| t.as_str().is_some_and(|s| !s.is_empty()))
                .collect(),
        ),
        seq @ Value::Sequence(_) => seq,
        other => Value::Sequence(vec![other]),
    }
}
