//! Recognised container labels and the rules that apply them.
//!
//! Record-shaping labels live in [`RECORD_RULES`], an ordered table the
//! mapper folds over. Name and skip labels are consulted before the fold
//! because they decide whether a record exists at all.

use crate::model::ServiceRecord;

pub const NAME: &str = "consul.name";
pub const IP: &str = "consul.ip";
pub const PORT: &str = "consul.port";
pub const SERVICE: &str = "consul.service";
pub const TAGS: &str = "consul.tags";
pub const SKIP: &str = "consul.skip";
pub const KV_PREFIX: &str = "consul.kv.";

/// `consul.ip` sentinel resolved to the bridge gateway.
pub const HOST_ADDRESS: &str = "host";

/// Inputs a rule may read besides the label value.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub gateway: &'a str,
}

type Apply = fn(&mut ServiceRecord, &str, &RuleContext<'_>);

/// One `(label key, handler)` row of the rule table.
pub struct LabelRule {
    pub key: &'static str,
    apply: Apply,
}

impl LabelRule {
    pub fn apply(&self, record: &mut ServiceRecord, value: &str, ctx: &RuleContext<'_>) {
        (self.apply)(record, value, ctx);
    }
}

impl std::fmt::Debug for LabelRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelRule").field("key", &self.key).finish()
    }
}

pub const RECORD_RULES: &[LabelRule] = &[
    LabelRule {
        key: IP,
        apply: apply_ip,
    },
    LabelRule {
        key: PORT,
        apply: apply_port,
    },
    LabelRule {
        key: SERVICE,
        apply: apply_service,
    },
    LabelRule {
        key: TAGS,
        apply: apply_tags,
    },
];

fn apply_ip(record: &mut ServiceRecord, value: &str, ctx: &RuleContext<'_>) {
    record.address = if value == HOST_ADDRESS {
        ctx.gateway.to_string()
    } else {
        value.to_string()
    };
}

fn apply_port(record: &mut ServiceRecord, value: &str, _ctx: &RuleContext<'_>) {
    record.port = parse_port(value);
}

fn apply_service(record: &mut ServiceRecord, value: &str, _ctx: &RuleContext<'_>) {
    record.service = value.to_string();
}

fn apply_tags(record: &mut ServiceRecord, value: &str, _ctx: &RuleContext<'_>) {
    record.tags = parse_tags(value);
}

/// Any value other than the literal `false` skips the container.
pub fn is_skip(value: &str) -> bool {
    value != "false"
}

/// Parses the leading decimal integer of a label value.
///
/// `"8080"` and `"8888 consul port"` both yield a port; values without
/// leading digits, or out of range for a port, yield `None`.
pub fn parse_port(value: &str) -> Option<u16> {
    let trimmed = value.trim_start();
    let digits = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(trimmed, |(idx, _)| &trimmed[..idx]);
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u16>().ok()
}

/// Splits a comma separated tag list, trimming each tag.
pub fn parse_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Suffix of a `consul.kv.*` label, if the key carries one.
pub fn auxiliary_suffix(key: &str) -> Option<&str> {
    key.strip_prefix(KV_PREFIX).filter(|suffix| !suffix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_record() -> ServiceRecord {
        ServiceRecord {
            node: "n".into(),
            address: "1.1.1.1".into(),
            service: "n".into(),
            port: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn rule_table_keys_are_unique() {
        let mut keys: Vec<_> = RECORD_RULES.iter().map(|r| r.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), RECORD_RULES.len());
    }

    #[test]
    fn port_parsing_accepts_leading_digits_only() {
        assert_eq!(parse_port("8080"), Some(8080));
        assert_eq!(parse_port(" 8888 consul port"), Some(8888));
        assert_eq!(parse_port("not a number"), None);
        assert_eq!(parse_port(""), None);
        assert_eq!(parse_port("-1"), None);
        assert_eq!(parse_port("70000"), None);
    }

    #[test]
    fn tags_are_trimmed() {
        assert_eq!(parse_tags("consul, tags ,x"), vec!["consul", "tags", "x"]);
        assert_eq!(parse_tags(" , "), Vec::<String>::new());
    }

    #[test]
    fn skip_only_disabled_by_literal_false() {
        assert!(!is_skip("false"));
        assert!(is_skip("true"));
        assert!(is_skip(""));
        assert!(is_skip("FALSE"));
    }

    #[test]
    fn host_sentinel_resolves_to_gateway() {
        let mut record = empty_record();
        let ctx = RuleContext { gateway: "172.17.0.1" };
        apply_ip(&mut record, "host", &ctx);
        assert_eq!(record.address, "172.17.0.1");
        apply_ip(&mut record, "10.1.1.1", &ctx);
        assert_eq!(record.address, "10.1.1.1");
    }

    #[test]
    fn auxiliary_suffix_requires_non_empty_suffix() {
        assert_eq!(auxiliary_suffix("consul.kv.db/url"), Some("db/url"));
        assert_eq!(auxiliary_suffix("consul.kv."), None);
        assert_eq!(auxiliary_suffix("consul.port"), None);
    }
}
