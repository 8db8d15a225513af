//! Last-resort source flattening (§4.7, §9 Open Question 5: only attempted
//! after a multi-file standard-JSON compile fails, and only when the caller
//! opted in via `autoFlatten`).
//!
//! This is deliberately not a full preprocessor: it walks the `import` graph
//! depth-first from the entry file, inlines each imported file's content
//! once (skipping files already inlined, so diamond imports don't duplicate
//! a library), strips `import` lines as it goes, and keeps exactly one
//! `pragma solidity` line and one `SPDX-License-Identifier` line — the entry
//! file's, in both cases.

use std::collections::BTreeSet;

use regex::Regex;

use crate::input::{Sources, resolve_import};

/// Flattens `entry` and everything it transitively imports into a single
/// Solidity source string. Returns `None` if `entry` isn't itself resolvable
/// in `sources`.
pub fn flatten(sources: &Sources, entry: &str) -> Option<String> {
    let import_re = Regex::new(r#"^\s*import\s+.*?["']([^"']+)["'].*?;\s*$"#).ok()?;
    let pragma_re = Regex::new(r"^\s*pragma\s+solidity\b").ok()?;
    let license_re = Regex::new(r"^\s*//\s*SPDX-License-Identifier:").ok()?;

    let entry_key = resolve_import(entry, sources)?.to_string();
    let mut visited = BTreeSet::new();
    let mut body = String::new();
    let mut pragma_written = false;
    let mut license_written = false;

    inline(
        &entry_key,
        sources,
        &import_re,
        &pragma_re,
        &license_re,
        &mut visited,
        &mut body,
        &mut pragma_written,
        &mut license_written,
        true,
    );

    Some(body)
}

#[allow(clippy::too_many_arguments)]
fn inline(
    key: &str,
    sources: &Sources,
    import_re: &Regex,
    pragma_re: &Regex,
    license_re: &Regex,
    visited: &mut BTreeSet<String>,
    out: &mut String,
    pragma_written: &mut bool,
    license_written: &mut bool,
    is_entry: bool,
) {
    if !visited.insert(key.to_string()) {
        return;
    }
    let Some(content) = sources.get(key) else {
        return;
    };

    for line in content.lines() {
        if let Some(caps) = import_re.captures(line) {
            let target = &caps[1];
            if let Some(resolved) = resolve_import(target, sources) {
                let resolved = resolved.to_string();
                inline(
                    &resolved, sources, import_re, pragma_re, license_re, visited, out, pragma_written,
                    license_written, false,
                );
            }
            continue;
        }
        if pragma_re.is_match(line) {
            if *pragma_written {
                continue;
            }
            *pragma_written = true;
        }
        if license_re.is_match(line) {
            if *license_written {
                continue;
            }
            *license_written = true;
        }
        out.push_str(line);
        out.push('\n');
    }

    let _ = is_entry;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inlines_single_dependency_once() {
        let mut sources = Sources::new();
        sources.insert(
            "Token.sol".to_string(),
            "pragma solidity ^0.8.0;\nimport \"./Safe.sol\";\ncontract Token is Safe {}\n".to_string(),
        );
        sources.insert(
            "Safe.sol".to_string(),
            "pragma solidity ^0.8.0;\nlibrary Safe {}\n".to_string(),
        );

        let flat = flatten(&sources, "Token.sol").expect("flattens");
        assert_eq!(flat.matches("pragma solidity").count(), 1);
        assert!(flat.contains("library Safe"));
        assert!(flat.contains("contract Token"));
        assert!(!flat.contains("import"));
    }

    #[test]
    fn duplicate_spdx_identifiers_are_deduplicated() {
        let mut sources = Sources::new();
        sources.insert(
            "Token.sol".to_string(),
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\nimport \"./Safe.sol\";\ncontract Token is Safe {}\n"
                .to_string(),
        );
        sources.insert(
            "Safe.sol".to_string(),
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\nlibrary Safe {}\n".to_string(),
        );

        let flat = flatten(&sources, "Token.sol").expect("flattens");
        assert_eq!(flat.matches("SPDX-License-Identifier").count(), 1);
    }

    #[test]
    fn diamond_import_only_inlined_once() {
        let mut sources = Sources::new();
        sources.insert(
            "A.sol".to_string(),
            "import \"./B.sol\";\nimport \"./C.sol\";\ncontract A {}\n".to_string(),
        );
        sources.insert("B.sol".to_string(), "import \"./Common.sol\";\ncontract B {}\n".to_string());
        sources.insert("C.sol".to_string(), "import \"./Common.sol\";\ncontract C {}\n".to_string());
        sources.insert("Common.sol".to_string(), "library Common {}\n".to_string());

        let flat = flatten(&sources, "A.sol").expect("flattens");
        assert_eq!(flat.matches("library Common").count(), 1);
    }
}
