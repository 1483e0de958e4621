use crate::error::ConfigError;
use crate::error::Result;

/// Variables a rule message template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateVar {
    RepetitionCount,
    BaseCommand,
    /// The raw, uncanonicalized last action. Requery templates only.
    Action,
}

impl TemplateVar {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "repetition_count" => Some(Self::RepetitionCount),
            "base_command" => Some(Self::BaseCommand),
            "action" => Some(Self::Action),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Var(TemplateVar),
}

/// Values substituted when a rule fires.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub repetition_count: usize,
    pub base_command: &'a str,
    pub action: &'a str,
}

/// A message template with `{{ variable }}` placeholders.
///
/// Parsed and validated against the rule kind's allowed variable set at
/// construction, so rendering can never fail. Braces outside a `{{ }}` pair
/// pass through literally.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parse `source`, permitting only `allowed` variables. `rule` names the
    /// originating rule for error messages.
    pub fn parse(source: &str, allowed: &[TemplateVar], rule: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(ConfigError::UnterminatedPlaceholder {
                    rule: rule.to_string(),
                });
            };
            let name = after[..end].trim();
            let var = TemplateVar::from_name(name)
                .filter(|v| allowed.contains(v))
                .ok_or_else(|| ConfigError::UnsupportedTemplateVariable {
                    rule: rule.to_string(),
                    variable: name.to_string(),
                })?;
            segments.push(Segment::Var(var));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(TemplateVar::RepetitionCount) => {
                    out.push_str(&ctx.repetition_count.to_string());
                }
                Segment::Var(TemplateVar::BaseCommand) => out.push_str(ctx.base_command),
                Segment::Var(TemplateVar::Action) => out.push_str(ctx.action),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: &[TemplateVar] = &[
        TemplateVar::RepetitionCount,
        TemplateVar::BaseCommand,
        TemplateVar::Action,
    ];

    fn ctx<'a>() -> TemplateContext<'a> {
        TemplateContext {
            repetition_count: 4,
            base_command: "grep",
            action: "grep -r foo /src",
        }
    }

    #[test]
    fn test_render_substitutes_variables() {
        let template = MessageTemplate::parse(
            "You ran `{{ base_command }}` {{ repetition_count }} times.",
            ALL_VARS,
            "warning_messages[0]",
        )
        .unwrap();
        assert_eq!(template.render(&ctx()), "You ran `grep` 4 times.");
    }

    #[test]
    fn test_action_variable_renders_raw_action() {
        let template =
            MessageTemplate::parse("Last action: {{action}}", ALL_VARS, "requery[0]").unwrap();
        assert_eq!(template.render(&ctx()), "Last action: grep -r foo /src");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let template = MessageTemplate::parse("no placeholders here", ALL_VARS, "r").unwrap();
        assert_eq!(template.render(&ctx()), "no placeholders here");
    }

    #[test]
    fn test_literal_braces_survive() {
        let template = MessageTemplate::parse("dict{a: 1} } {", ALL_VARS, "r").unwrap();
        assert_eq!(template.render(&ctx()), "dict{a: 1} } {");
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let err = MessageTemplate::parse("{{ nonsense }}", ALL_VARS, "requery[1]").unwrap_err();
        match err {
            ConfigError::UnsupportedTemplateVariable { rule, variable } => {
                assert_eq!(rule, "requery[1]");
                assert_eq!(variable, "nonsense");
            }
            other => panic!("expected UnsupportedTemplateVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_disallowed_variable_is_rejected() {
        // `action` is valid in general but not for warning templates.
        let allowed = &[TemplateVar::RepetitionCount, TemplateVar::BaseCommand];
        let err = MessageTemplate::parse("{{ action }}", allowed, "warning_messages[2]")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedTemplateVariable { .. }
        ));
    }

    #[test]
    fn test_unterminated_placeholder_is_rejected() {
        let err = MessageTemplate::parse("oops {{ base_command", ALL_VARS, "r").unwrap_err();
        assert!(matches!(err, ConfigError::UnterminatedPlaceholder { .. }));
    }
}
