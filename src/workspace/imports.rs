//! Import analysis over local and dependency `.proto` files

use crate::error::{BufError, BufResult};
use crate::module::{ModuleData, ModuleFullName};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Imports under this prefix resolve to the compiler's built-in copies when
/// no module provides them
const BUILTIN_PREFIX: &str = "google/protobuf/";

/// Extract the paths named by `import` statements
pub fn parse_imports(content: &str) -> Vec<String> {
    let stripped = strip_comments(content);
    let mut imports = Vec::new();
    for statement in stripped.split(';') {
        let statement = statement.trim();
        let Some(rest) = statement.strip_prefix("import") else {
            continue;
        };
        if !rest.starts_with(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
            continue;
        }
        let rest = rest.trim_start();
        let rest = rest
            .strip_prefix("public")
            .or_else(|| rest.strip_prefix("weak"))
            .unwrap_or(rest)
            .trim_start();
        let mut chars = rest.chars();
        let Some(quote @ ('"' | '\'')) = chars.next() else {
            continue;
        };
        let body: String = chars.take_while(|c| *c != quote).collect();
        if !body.is_empty() {
            imports.push(body);
        }
    }
    imports
}

fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string: Option<char> = None;
    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            ('"' | '\'', _) => {
                in_string = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Owner {
    Local,
    Remote(ModuleFullName),
}

impl Owner {
    fn describe(&self) -> String {
        match self {
            Self::Local => "the workspace".to_string(),
            Self::Remote(name) => name.to_string(),
        }
    }
}

/// Remote modules a workspace actually imports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedModules {
    /// Imported from a local file or, transitively, from an imported file
    pub all: BTreeSet<ModuleFullName>,
}

/// Follow imports from the local files through the files of `deps`
///
/// `local_files` are `(path, content)` pairs relative to their module roots.
/// Dependency modules named in `local_names` are skipped; the workspace copy
/// of a module always wins.
pub fn analyze<'a>(
    local_files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
    deps: &[ModuleData],
    local_names: &HashSet<ModuleFullName>,
) -> BufResult<UsedModules> {
    let mut index: HashMap<&str, (Owner, &[u8])> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for (path, content) in local_files {
        insert(&mut index, path, Owner::Local, content)?;
        queue.push_back(path);
    }
    for data in deps {
        let name = data.key().full_name();
        if local_names.contains(name) {
            continue;
        }
        for (path, content) in data.files() {
            if !path.ends_with(".proto") {
                continue;
            }
            insert(&mut index, path, Owner::Remote(name.clone()), content)?;
        }
    }

    let mut used = UsedModules::default();
    let mut visited: HashSet<&str> = queue.iter().copied().collect();
    while let Some(path) = queue.pop_front() {
        let Some((_, content)) = index.get(path) else {
            continue;
        };
        let text = String::from_utf8_lossy(content);
        for import in parse_imports(&text) {
            let Some((&import_path, (owner, _))) = index.get_key_value(import.as_str()) else {
                if import.starts_with(BUILTIN_PREFIX) {
                    debug!("Treating {} as built in", import);
                    continue;
                }
                return Err(BufError::ImportNotFound {
                    import,
                    file: path.to_string(),
                });
            };
            if let Owner::Remote(name) = owner {
                used.all.insert(name.clone());
            }
            if visited.insert(import_path) {
                queue.push_back(import_path);
            }
        }
    }

    debug!("Workspace imports {} module(s)", used.all.len());
    Ok(used)
}

fn insert<'a>(
    index: &mut HashMap<&'a str, (Owner, &'a [u8])>,
    path: &'a str,
    owner: Owner,
    content: &'a [u8],
) -> BufResult<()> {
    if let Some((existing, _)) = index.get(path) {
        if *existing != owner || owner == Owner::Local {
            return Err(BufError::DuplicateFile {
                path: path.to_string(),
                first: existing.describe(),
                second: owner.describe(),
            });
        }
    }
    index.insert(path, (owner, content));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Digest, DigestType, ModuleKey};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn module(name: &str, files: &[(&str, &str)]) -> ModuleData {
        let files: BTreeMap<String, Vec<u8>> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect();
        let digest = Digest::for_content(
            DigestType::Sha256,
            files.iter().map(|(p, c)| (p.as_str(), c.as_slice())),
            &[],
        );
        let key = ModuleKey::new(ModuleFullName::parse(name).unwrap(), Uuid::new_v4(), digest);
        ModuleData::new(key, files, vec![])
    }

    fn name(s: &str) -> ModuleFullName {
        ModuleFullName::parse(s).unwrap()
    }

    #[test]
    fn parses_import_forms() {
        let content = r#"
syntax = "proto3";
// import "commented/out.proto";
import "acme/units/v1/units.proto";
import public "acme/geo/v1/geo.proto";
import weak 'legacy/old.proto';
/* import "block/comment.proto"; */
import "google/protobuf/timestamp.proto"; import "same/line.proto";
message Imported { string import = 1; }
"#;
        assert_eq!(
            parse_imports(content),
            vec![
                "acme/units/v1/units.proto",
                "acme/geo/v1/geo.proto",
                "legacy/old.proto",
                "google/protobuf/timestamp.proto",
                "same/line.proto",
            ]
        );
    }

    #[test]
    fn transitive_imports_are_used() {
        let a = module("buf.build/acme/a", &[("a/a.proto", "import \"c/c.proto\";")]);
        let b = module("buf.build/acme/b", &[("b/b.proto", "")]);
        let c = module("buf.build/acme/c", &[("c/c.proto", "")]);
        let local = [("weather.proto", b"import \"a/a.proto\";".as_slice())];

        let used = analyze(local, &[a, b, c], &HashSet::new()).unwrap();

        assert_eq!(
            used.all,
            BTreeSet::from([name("buf.build/acme/a"), name("buf.build/acme/c")])
        );
    }

    #[test]
    fn unresolved_import_is_an_error() {
        let local = [("weather.proto", b"import \"missing.proto\";".as_slice())];
        let err = analyze(local, &[], &HashSet::new()).unwrap_err();
        assert!(matches!(err, BufError::ImportNotFound { .. }));
    }

    #[test]
    fn builtin_imports_need_no_module() {
        let local = [(
            "weather.proto",
            b"import \"google/protobuf/timestamp.proto\";".as_slice(),
        )];
        let used = analyze(local, &[], &HashSet::new()).unwrap();
        assert!(used.all.is_empty());
    }

    #[test]
    fn file_in_two_modules_is_a_conflict() {
        let a = module("buf.build/acme/a", &[("shared.proto", "")]);
        let b = module("buf.build/acme/b", &[("shared.proto", "")]);
        let err = analyze(std::iter::empty(), &[a, b], &HashSet::new()).unwrap_err();
        assert!(matches!(err, BufError::DuplicateFile { .. }));
    }

    #[test]
    fn local_module_shadows_remote_copy() {
        let remote_copy = module("buf.build/acme/local", &[("local.proto", "")]);
        let local = [
            ("local.proto", b"".as_slice()),
            ("main.proto", b"import \"local.proto\";".as_slice()),
        ];
        let names = HashSet::from([name("buf.build/acme/local")]);
        let used = analyze(local, &[remote_copy], &names).unwrap();
        assert!(used.all.is_empty());
    }
}
