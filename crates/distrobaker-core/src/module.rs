//! Module name parsing (`name[:stream]`, spec §3).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleName {
    pub name: String,
    pub stream: String,
}

/// Split a module component name into `name`/`stream`. Stream defaults to
/// `"master"` when absent or empty; any extra colon-delimited fields are
/// ignored (spec §3).
pub fn split_module(comp: &str) -> ModuleName {
    let mut fields = comp.split(':');
    let name = fields.next().unwrap_or("").to_string();
    let stream = match fields.next() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "master".to_string(),
    };
    ModuleName { name, stream }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_stream_to_master_when_absent() {
        let m = split_module("nodejs");
        assert_eq!(m.name, "nodejs");
        assert_eq!(m.stream, "master");
    }

    #[test]
    fn defaults_stream_to_master_when_empty() {
        let m = split_module("nodejs:");
        assert_eq!(m.stream, "master");
    }

    #[test]
    fn keeps_explicit_stream() {
        let m = split_module("nodejs:18");
        assert_eq!(m.name, "nodejs");
        assert_eq!(m.stream, "18");
    }

    #[test]
    fn ignores_extra_fields() {
        let m = split_module("nodejs:18:extra:fields");
        assert_eq!(m.name, "nodejs");
        assert_eq!(m.stream, "18");
    }

    proptest! {
        // spec §8: "Split-module default".
        #[test]
        fn split_module_default(
            name in "[a-zA-Z0-9_-]{1,16}",
            stream in "[a-zA-Z0-9_-]{0,16}",
        ) {
            let input = if stream.is_empty() {
                name.clone()
            } else {
                format!("{name}:{stream}")
            };
            let m = split_module(&input);
            prop_assert_eq!(m.name, name);
            let expected_stream = if stream.is_empty() { "master".to_string() } else { stream };
            prop_assert_eq!(m.stream, expected_stream);
        }
    }
}
