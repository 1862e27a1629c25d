//! Shell-style variable expansion: `${NAME}`, `${NAME:-default}`,
//! `${NAME:?message}`, with arbitrary nesting (e.g. a default value that
//! itself contains `${OTHER}`). The teacher's regex-based `VAR_REGEX`
//! cannot express nesting — balanced `${...}` isn't a regular language —
//! so this is a hand-written recursive-descent parser instead.

use pdk_core::error::VariableError;

use crate::resolver::VariableResolver;

const MAX_EXPANSION_DEPTH: usize = 32;

/// Expand every `${...}` reference in `input` against `resolver`.
pub fn expand(input: &str, resolver: &VariableResolver) -> Result<String, VariableError> {
    expand_with_depth(input, resolver, 0)
}

fn expand_with_depth(input: &str, resolver: &VariableResolver, depth: usize) -> Result<String, VariableError> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(VariableError::ExpansionLoop(input.to_string()));
    }

    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            let (expr, consumed) = extract_braced_expression(&input[i + 2..])?;
            out.push_str(&expand_expression(&expr, resolver, depth)?);
            i += 2 + consumed;
        } else {
            let ch_len = input[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            out.push_str(&input[i..i + ch_len]);
            i += ch_len;
        }
    }

    Ok(out)
}

/// Find the matching `}` for the `${` already consumed, respecting nested
/// `${...}` inside the expression (e.g. inside a default value). Returns
/// the inner text and the number of bytes consumed including the final `}`.
fn extract_braced_expression(rest: &str) -> Result<(String, usize), VariableError> {
    let bytes = rest.as_bytes();
    let mut depth = 1;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'}' {
            depth -= 1;
            if depth == 0 {
                return Ok((rest[..i].to_string(), i + 1));
            }
            i += 1;
            continue;
        }
        i += 1;
    }

    Err(VariableError::Malformed(format!("unterminated ${{...}} in '{rest}'")))
}

/// Parse and resolve a single `${...}` body: `NAME`, `NAME:-default`, or
/// `NAME:?message`.
fn expand_expression(expr: &str, resolver: &VariableResolver, depth: usize) -> Result<String, VariableError> {
    if let Some((name, default)) = split_operator(expr, ":-") {
        if let Some(value) = resolver.get(name) {
            return Ok(value.to_string());
        }
        return expand_with_depth(default, resolver, depth + 1);
    }

    if let Some((name, message)) = split_operator(expr, ":?") {
        return resolver.get(name).map(str::to_string).ok_or_else(|| {
            VariableError::RequiredVariableMissing {
                name: name.to_string(),
                message: message.to_string(),
            }
        });
    }

    resolver
        .get(expr)
        .map(str::to_string)
        .ok_or_else(|| VariableError::RequiredVariableMissing {
            name: expr.to_string(),
            message: format!("variable '{expr}' is not defined"),
        })
}

/// Split `expr` on the first top-level occurrence of `operator`, ignoring
/// occurrences inside a nested `${...}`.
fn split_operator<'a>(expr: &'a str, operator: &str) -> Option<(&'a str, &'a str)> {
    let bytes = expr.as_bytes();
    let op_bytes = operator.as_bytes();
    let mut depth = 0;
    let mut i = 0;

    while i + op_bytes.len() <= bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'}' && depth > 0 {
            depth -= 1;
            i += 1;
            continue;
        }
        if depth == 0 && &bytes[i..i + op_bytes.len()] == op_bytes {
            return Some((&expr[..i], &expr[i + op_bytes.len()..]));
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdk_core::variable::Provenance;

    fn resolver_with(pairs: &[(&str, &str)]) -> VariableResolver {
        let mut resolver = VariableResolver::new();
        for (name, value) in pairs {
            resolver.insert(*name, *value, Provenance::Configuration);
        }
        resolver
    }

    #[test]
    fn expands_plain_reference() {
        let resolver = resolver_with(&[("NAME", "world")]);
        assert_eq!(expand("hello ${NAME}", &resolver).unwrap(), "hello world");
    }

    #[test]
    fn missing_variable_without_default_errors() {
        let resolver = resolver_with(&[]);
        let err = expand("${MISSING}", &resolver).unwrap_err();
        assert!(matches!(err, VariableError::RequiredVariableMissing { .. }));
    }

    #[test]
    fn default_value_used_when_variable_absent() {
        let resolver = resolver_with(&[]);
        assert_eq!(expand("${MISSING:-fallback}", &resolver).unwrap(), "fallback");
    }

    #[test]
    fn default_value_ignored_when_variable_present() {
        let resolver = resolver_with(&[("NAME", "set")]);
        assert_eq!(expand("${NAME:-fallback}", &resolver).unwrap(), "set");
    }

    #[test]
    fn required_operator_surfaces_custom_message() {
        let resolver = resolver_with(&[]);
        let err = expand("${TOKEN:?token is required}", &resolver).unwrap_err();
        match err {
            VariableError::RequiredVariableMissing { name, message } => {
                assert_eq!(name, "TOKEN");
                assert_eq!(message, "token is required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn required_operator_succeeds_when_variable_present() {
        let resolver = resolver_with(&[("TOKEN", "abc")]);
        assert_eq!(expand("${TOKEN:?token is required}", &resolver).unwrap(), "abc");
    }

    #[test]
    fn nested_default_expands_inner_reference() {
        let resolver = resolver_with(&[("FALLBACK_NAME", "inner-value")]);
        assert_eq!(
            expand("${MISSING:-${FALLBACK_NAME}}", &resolver).unwrap(),
            "inner-value"
        );
    }

    #[test]
    fn multiple_references_in_one_string_all_expand() {
        let resolver = resolver_with(&[("A", "1"), ("B", "2")]);
        assert_eq!(expand("${A}-${B}", &resolver).unwrap(), "1-2");
    }

    #[test]
    fn unterminated_brace_is_malformed() {
        let resolver = resolver_with(&[]);
        let err = expand("${NAME", &resolver).unwrap_err();
        assert!(matches!(err, VariableError::Malformed(_)));
    }

    #[test]
    fn text_without_variables_passes_through_unchanged() {
        let resolver = resolver_with(&[]);
        assert_eq!(expand("no variables here", &resolver).unwrap(), "no variables here");
    }
}
