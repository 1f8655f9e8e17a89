//! Commit message format

use archgate_artifact::{ChangeEnvelope, DiffStats};

/// Build the commit message for an applied envelope
///
/// ```text
/// feat(mARCH): <plan_line_id> <role> <module>
///
/// patch_id: <id>
/// plan_line_id: <plan_line_id>
/// status: global_status=<gs>; file_checker=<fc>; module_checker=<mc>
/// notes: <notes, or blast_radius=...>
/// ```
///
/// The role is lowercased; missing fields get placeholders.
#[must_use]
pub fn build_commit_message(
    envelope: &ChangeEnvelope,
    diff: Option<&DiffStats>,
    notes: Option<&str>,
) -> String {
    let meta = &envelope.meta;
    let plan_line = or(meta.plan_line_id(), "PL-UNKNOWN");
    let role = or(meta.role(), "role?").to_lowercase();
    let module = or(meta.module(), "module?");

    let global_status = envelope
        .global_status()
        .map_or("∅", archgate_artifact::GlobalStatus::as_str);
    let status = format!(
        "status: global_status={global_status}; file_checker={}; module_checker={}",
        or(meta.file_check(), "∅").to_lowercase(),
        or(meta.module_check(), "∅").to_lowercase(),
    );

    let notes = match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => n.to_string(),
        None => format!(
            "blast_radius={}",
            diff.map_or_else(|| "n/a".to_string(), DiffStats::blast_radius)
        ),
    };

    [
        format!("feat(mARCH): {plan_line} {role} {module}"),
        String::new(),
        format!("patch_id: {}", envelope.id()),
        format!("plan_line_id: {plan_line}"),
        status,
        format!("notes: {notes}"),
    ]
    .join("\n")
}

fn or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archgate_artifact::FileStat;
    use archgate_test_utils::{accepted_envelope, hello_payload};
    use pretty_assertions::assert_eq;

    #[test]
    fn full_message() {
        let env = accepted_envelope("app/hello.py", &hello_payload("def hello(): pass"));
        let diff = DiffStats::from_files(
            vec![FileStat {
                path: "app/hello.py".into(),
                added: 4,
                deleted: 0,
            }],
            false,
            120,
        );
        let message = build_commit_message(&env, Some(&diff), None);
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines[0], "feat(mARCH): PL-0001 implementer app");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], format!("patch_id: {}", env.id()));
        assert_eq!(
            lines[4],
            "status: global_status=ok; file_checker=ok; module_checker=ok"
        );
        assert_eq!(lines[5], "notes: blast_radius=files=1 +4 -0 bytes=120");
    }

    #[test]
    fn placeholders_and_notes() {
        let env = ChangeEnvelope::new("x");
        let message = build_commit_message(&env, None, Some("  manual hotfix "));
        assert!(message.starts_with("feat(mARCH): PL-UNKNOWN role? module?\n\n"));
        assert!(message.contains("global_status=∅; file_checker=∅; module_checker=∅"));
        assert!(message.ends_with("notes: manual hotfix"));
    }
}
