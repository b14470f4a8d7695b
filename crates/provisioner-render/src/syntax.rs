//! Dot-prefixed action syntax
//!
//! Boot environment records written for the original provisioner use
//! text/template actions: `{{.Machine.HexAddress}}`, `{{.BootParams}}`,
//! `{{.ParseUrl "host" .CommandURL}}`, `{{.Param "dns-domain"}}`. Before
//! compilation every such action is rewritten to the equivalent expression
//! (`{{ Machine.HexAddress }}`, `{{ bootParams() }}`, ...). Actions that do
//! not start with a dot path are left alone, so native expressions and
//! statements keep working. Go control actions (`if`, `range`, pipelines)
//! are not translated.

/// Go method names and the helper functions they map to
const METHODS: [(&str, &str); 3] = [
    ("BootParams", "bootParams"),
    ("ParseUrl", "parseUrl"),
    ("Param", "param"),
];

/// Rewrite every dot-prefixed action in a template source
pub fn normalize_actions(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let body_start = &rest[start + 2..];

        // Unterminated action, leave it for the parser to report
        let Some(end) = find_close(body_start) else {
            out.push_str(&rest[start..]);
            return out;
        };

        out.push_str("{{");
        out.push_str(&rewrite_action(&body_start[..end]));
        out.push_str("}}");
        rest = &body_start[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Offset of the closing `}}`, skipping quoted strings
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' || b == b'`' {
                    quote = Some(b);
                } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn rewrite_action(body: &str) -> String {
    let (open, inner) = match body.strip_prefix('-') {
        Some(inner) => ("-", inner),
        None => ("", body),
    };
    let (inner, close) = match inner.strip_suffix('-') {
        Some(inner) => (inner, "-"),
        None => (inner, ""),
    };

    match translate(inner.trim()) {
        Some(expr) => format!("{} {} {}", open, expr, close),
        None => body.to_string(),
    }
}

/// Translate one action body, `None` if it is not a dot-path action
fn translate(action: &str) -> Option<String> {
    let tokens = tokenize(action)?;
    let (head, args) = tokens.split_first()?;
    let head = dot_path(head)?;

    if let Some((_, helper)) = METHODS.iter().find(|(method, _)| *method == head) {
        let args = args
            .iter()
            .map(|arg| argument(arg))
            .collect::<Option<Vec<_>>>()?;
        return Some(format!("{}({})", helper, args.join(", ")));
    }

    if args.is_empty() {
        Some(head.to_string())
    } else {
        None
    }
}

fn argument(token: &str) -> Option<String> {
    if token.starts_with('"') {
        Some(token.to_string())
    } else {
        dot_path(token).map(str::to_string)
    }
}

/// `.A.B` without its leading dot, if every segment is an identifier
fn dot_path(token: &str) -> Option<&str> {
    let path = token.strip_prefix('.')?;
    let valid = path.split('.').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    valid.then_some(path)
}

/// Split on whitespace, keeping double-quoted strings whole
///
/// Any other token shape means the action is not one we translate.
fn tokenize(action: &str) -> Option<Vec<&str>> {
    let bytes = action.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if bytes[i] == b'"' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= bytes.len() {
                return None;
            }
            i += 1;
        } else if bytes[i] == b'.' {
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
        } else {
            return None;
        }
        tokens.push(&action[start..i]);
    }

    Some(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access() {
        assert_eq!(
            normalize_actions("pxelinux.cfg/{{.Machine.HexAddress}}"),
            "pxelinux.cfg/{{ Machine.HexAddress }}"
        );
        assert_eq!(normalize_actions("{{ .Env.OS.Name }}/x"), "{{ Env.OS.Name }}/x");
    }

    #[test]
    fn test_method_calls() {
        assert_eq!(normalize_actions("append {{.BootParams}}"), "append {{ bootParams() }}");
        assert_eq!(
            normalize_actions(r#"{{.ParseUrl "host" .CommandURL}}"#),
            r#"{{ parseUrl("host", CommandURL) }}"#
        );
        assert_eq!(
            normalize_actions(r#"domain={{.Param "dns-domain"}}"#),
            r#"domain={{ param("dns-domain") }}"#
        );
    }

    #[test]
    fn test_trim_markers_kept() {
        assert_eq!(normalize_actions("a {{- .Machine.Name -}} b"), "a {{- Machine.Name -}} b");
    }

    #[test]
    fn test_native_expressions_untouched() {
        let native =
            "{{ Machine.HexAddress }} {{ pathFor('tftp', Env.Kernel) }} {% if x %}y{% endif %}";
        assert_eq!(normalize_actions(native), native);
    }

    #[test]
    fn test_quoted_braces_and_unterminated() {
        assert_eq!(
            normalize_actions(r#"{{.Param "a}}b"}}"#),
            r#"{{ param("a}}b") }}"#
        );
        assert_eq!(normalize_actions("x {{.Machine.Name"), "x {{.Machine.Name");
    }

    #[test]
    fn test_unsupported_actions_untouched() {
        assert_eq!(normalize_actions("{{.}}"), "{{.}}");
        assert_eq!(normalize_actions("{{.Machine.Name | printf}}"), "{{.Machine.Name | printf}}");
    }
}
