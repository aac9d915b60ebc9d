//! Naming rules for declarations.
//!
//! Type-ish names are `_?[A-Z]…`, value-ish names `_?[a-z]…`; double or
//! trailing underscores are never allowed, primes only at the end and only
//! where a rule permits them. `$` prefixes mark compiler-internal names and
//! bypass these checks.

pub struct NameSpec {
    pub desc: &'static str,
    pub start_upper: bool,
    pub allow_leading_underscore: bool,
    pub allow_underscore: bool,
    pub allow_tick: bool,
}

pub const TYPE_NAME: NameSpec = NameSpec {
    desc: "type",
    start_upper: true,
    allow_leading_underscore: true,
    allow_underscore: false,
    allow_tick: false,
};

pub const TYPE_PARAM_NAME: NameSpec = NameSpec {
    desc: "type parameter",
    start_upper: true,
    allow_leading_underscore: false,
    allow_underscore: false,
    allow_tick: false,
};

pub const FIELD_NAME: NameSpec = NameSpec {
    desc: "field",
    start_upper: false,
    allow_leading_underscore: true,
    allow_underscore: true,
    allow_tick: true,
};

pub const METHOD_NAME: NameSpec = NameSpec {
    desc: "method",
    start_upper: false,
    allow_leading_underscore: true,
    allow_underscore: true,
    allow_tick: false,
};

pub const PARAM_NAME: NameSpec = NameSpec {
    desc: "parameter",
    start_upper: false,
    allow_leading_underscore: false,
    allow_underscore: true,
    allow_tick: true,
};

pub const LOCAL_NAME: NameSpec = NameSpec {
    desc: "local variable",
    start_upper: false,
    allow_leading_underscore: false,
    allow_underscore: true,
    allow_tick: true,
};

/// Check a declared name against a rule. `Ok` for internal (`$`) names and
/// the don't-care name.
pub fn check_name(name: &str, spec: &NameSpec) -> Result<(), String> {
    if name.starts_with('$') || name == "_" {
        return Ok(());
    }

    let mut rest = name;
    let mut prev = '\0';

    if let Some(stripped) = rest.strip_prefix('_') {
        if !spec.allow_leading_underscore {
            return Err(format!(
                "{} name \"{name}\" cannot start with an underscore",
                spec.desc
            ));
        }
        rest = stripped;
        prev = '_';
    }

    let first = rest.chars().next().unwrap_or('\0');
    if spec.start_upper && !first.is_ascii_uppercase() {
        return Err(format!(
            "{} name \"{name}\" must start A-Z or _(A-Z)",
            spec.desc
        ));
    }
    if !spec.start_upper && !first.is_ascii_lowercase() {
        return Err(format!(
            "{} name \"{name}\" must start a-z or _(a-z)",
            spec.desc
        ));
    }

    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.peek().copied() {
        if c == '\'' {
            break;
        }
        chars.next();

        if c == '_' {
            if !spec.allow_underscore {
                return Err(format!(
                    "{} name \"{name}\" cannot contain underscores",
                    spec.desc
                ));
            }
            if prev == '_' {
                return Err(format!(
                    "{} name \"{name}\" cannot contain double underscores",
                    spec.desc
                ));
            }
        }
        prev = c;
    }

    if prev == '_' {
        return Err(format!(
            "{} name \"{name}\" cannot end with an underscore",
            spec.desc
        ));
    }

    let ticks: String = chars.collect();
    if !ticks.is_empty() {
        if !spec.allow_tick {
            return Err(format!(
                "{} name \"{name}\" cannot contain a prime (')",
                spec.desc
            ));
        }
        if ticks.chars().any(|c| c != '\'') {
            return Err(format!(
                "a prime (') can only appear at the end of {} name \"{name}\"",
                spec.desc
            ));
        }
    }

    Ok(())
}

pub fn is_type_name(name: &str) -> bool {
    let trimmed = name.trim_start_matches('$').trim_start_matches('_');
    trimmed.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

pub fn is_private(name: &str) -> bool {
    name.starts_with('_')
}

pub fn is_dontcare(name: &str) -> bool {
    name == "_"
}

pub fn is_internal(name: &str) -> bool {
    name.starts_with('$')
}

pub fn is_ffi(name: &str) -> bool {
    name.starts_with('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert!(check_name("Wombat", &TYPE_NAME).is_ok());
        assert!(check_name("_Private", &TYPE_NAME).is_ok());
        assert!(check_name("wombat", &TYPE_NAME).is_err());
        assert!(check_name("Wom_bat", &TYPE_NAME).is_err());
        assert!(check_name("Wombat'", &TYPE_NAME).is_err());
    }

    #[test]
    fn test_value_names() {
        assert!(check_name("foo_bar", &LOCAL_NAME).is_ok());
        assert!(check_name("foo'", &LOCAL_NAME).is_ok());
        assert!(check_name("foo''", &LOCAL_NAME).is_ok());
        assert!(check_name("_foo", &LOCAL_NAME).is_err());
        assert!(check_name("foo__bar", &LOCAL_NAME).is_err());
        assert!(check_name("foo_", &LOCAL_NAME).is_err());
        assert!(check_name("fo'o", &LOCAL_NAME).is_err());
        assert!(check_name("_foo", &FIELD_NAME).is_ok());
    }

    #[test]
    fn test_special_names_bypass() {
        assert!(check_name("$synth", &LOCAL_NAME).is_ok());
        assert!(check_name("_", &LOCAL_NAME).is_ok());
        assert!(is_dontcare("_"));
        assert!(is_private("_foo"));
        assert!(is_type_name("_Wombat"));
        assert!(!is_type_name("wombat"));
    }
}
