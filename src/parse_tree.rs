//! Normalization of externally parsed module trees.
//!
//! Parsers hand us statement trees in their own shape; everything downstream
//! works on [`IntermediateNode`], which carries the full root-to-node path and
//! the few attributes the graph needs.

use crate::error::{Error, Result};

/// Keywords that define data nodes. Everything else (typedefs, groupings,
/// rpcs, notifications) is skipped.
pub const DATA_DEFINITION_KEYWORDS: [&str; 8] = [
    "container",
    "leaf",
    "leaf-list",
    "list",
    "choice",
    "case",
    "anyxml",
    "anydata",
];

/// Keywords that only group alternatives and never appear in a path.
const TRANSPARENT_KEYWORDS: [&str; 2] = ["choice", "case"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub module: String,
    pub prefix: String,
    pub local_name: String,
}

impl PathSegment {
    pub fn new(
        module: impl Into<String>,
        prefix: impl Into<String>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            prefix: prefix.into(),
            local_name: local_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateNode {
    pub path_segments: Vec<PathSegment>,
    pub description: Option<String>,
    pub is_configurable: bool,
    pub primitive_type: Option<String>,
    pub children: Vec<IntermediateNode>,
}

/// What the adapter needs from a parser's statement node.
pub trait StatementNode: Sized {
    fn keyword(&self) -> &str;
    fn name(&self) -> Option<&str>;
    fn module(&self) -> Option<&str>;
    fn prefix(&self) -> Option<&str>;
    fn description(&self) -> Option<&str>;
    /// Explicit `config` flag; `None` inherits from the parent, or is
    /// false at the top level.
    fn read_write(&self) -> Option<bool>;
    /// The declared type resolved to its primitive root, `None` for nodes
    /// without a type.
    fn primitive_type(&self) -> Result<Option<String>>;
    fn children(&self) -> &[Self];
}

/// A module revision after adaptation.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedModule {
    pub name: String,
    pub revision: Option<String>,
    pub roots: Vec<IntermediateNode>,
}

pub struct ParseTreeAdapter<'a> {
    source_name: &'a str,
}

impl<'a> ParseTreeAdapter<'a> {
    /// `source_name` identifies the input in error messages.
    pub fn new(source_name: &'a str) -> Self {
        Self { source_name }
    }

    /// Adapt the data-definition children of a module root.
    ///
    /// A node without a `config` flag takes its parent's, and top-level
    /// nodes without one are not configurable. The walk keeps its own
    /// stack, so arbitrarily deep trees are fine.
    pub fn adapt<N: StatementNode>(
        &self,
        root: &N,
    ) -> Result<Vec<IntermediateNode>> {
        // Pre-order arena of adapted nodes and the slot of their parent.
        let mut arena: Vec<(Option<usize>, IntermediateNode)> = Vec::new();
        let mut stack: Vec<(&N, Option<usize>, bool)> = root
            .children()
            .iter()
            .rev()
            .map(|child| (child, None, false))
            .collect();

        while let Some((node, parent, parent_config)) = stack.pop() {
            let keyword = node.keyword();
            if !DATA_DEFINITION_KEYWORDS.contains(&keyword) {
                continue;
            }
            let config = node.read_write().unwrap_or(parent_config);

            if TRANSPARENT_KEYWORDS.contains(&keyword) {
                stack.extend(
                    node.children().iter().rev().map(|c| (c, parent, config)),
                );
                continue;
            }

            let name =
                node.name().ok_or_else(|| self.malformed(node, "name"))?;
            let module =
                node.module().ok_or_else(|| self.malformed(node, "module"))?;
            let prefix = node.prefix().unwrap_or(module);

            let mut path_segments = match parent {
                Some(slot) => arena[slot].1.path_segments.clone(),
                None => Vec::new(),
            };
            path_segments.push(PathSegment::new(module, prefix, name));

            let slot = arena.len();
            arena.push((
                parent,
                IntermediateNode {
                    primitive_type: node.primitive_type()?,
                    description: node.description().map(str::to_string),
                    is_configurable: config,
                    path_segments,
                    children: Vec::new(),
                },
            ));
            stack.extend(
                node.children().iter().rev().map(|c| (c, Some(slot), config)),
            );
        }

        // Children always sit after their parent, so folding from the back
        // completes every node before it is attached. Siblings arrive
        // reversed.
        let mut roots = Vec::new();
        while let Some((parent, mut node)) = arena.pop() {
            node.children.reverse();
            match parent {
                Some(slot) => arena[slot].1.children.push(node),
                None => roots.push(node),
            }
        }
        roots.reverse();
        Ok(roots)
    }

    fn malformed<N: StatementNode>(&self, node: &N, missing: &str) -> Error {
        Error::MalformedSourceTree {
            source_name: self.source_name.to_string(),
            reason: format!("{} statement without {missing}", node.keyword()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Stub {
        keyword: &'static str,
        name: Option<&'static str>,
        module: Option<&'static str>,
        config: Option<bool>,
        ty: Option<&'static str>,
        children: Vec<Stub>,
    }

    impl StatementNode for Stub {
        fn keyword(&self) -> &str {
            self.keyword
        }
        fn name(&self) -> Option<&str> {
            self.name
        }
        fn module(&self) -> Option<&str> {
            self.module
        }
        fn prefix(&self) -> Option<&str> {
            Some("p")
        }
        fn description(&self) -> Option<&str> {
            None
        }
        fn read_write(&self) -> Option<bool> {
            self.config
        }
        fn primitive_type(&self) -> Result<Option<String>> {
            Ok(self.ty.map(str::to_string))
        }
        fn children(&self) -> &[Self] {
            &self.children
        }
    }

    fn node(keyword: &'static str, name: &'static str) -> Stub {
        Stub {
            keyword,
            name: Some(name),
            module: Some("m"),
            ..Default::default()
        }
    }

    fn with(mut parent: Stub, children: Vec<Stub>) -> Stub {
        parent.children = children;
        parent
    }

    fn names(nodes: &[IntermediateNode]) -> Vec<&str> {
        nodes
            .iter()
            .map(|n| n.path_segments.last().unwrap().local_name.as_str())
            .collect()
    }

    #[test]
    fn keeps_only_data_definitions_in_order() {
        let root = with(
            node("module", "m"),
            vec![
                node("leaf", "b"),
                node("typedef", "t"),
                node("container", "a"),
                node("rpc", "r"),
                node("list", "c"),
            ],
        );
        let out = ParseTreeAdapter::new("m.json").adapt(&root).unwrap();
        assert_eq!(names(&out), ["b", "a", "c"]);
    }

    #[test]
    fn choice_and_case_are_spliced() {
        let root = with(
            node("module", "m"),
            vec![with(
                node("container", "top"),
                vec![
                    node("leaf", "first"),
                    with(
                        node("choice", "ch"),
                        vec![
                            with(node("case", "x"), vec![node("leaf", "x1")]),
                            node("leaf", "y1"),
                        ],
                    ),
                    node("leaf", "last"),
                ],
            )],
        );
        let out = ParseTreeAdapter::new("m.json").adapt(&root).unwrap();
        let top = &out[0];
        assert_eq!(names(&top.children), ["first", "x1", "y1", "last"]);

        let x1 = &top.children[1];
        let path: Vec<_> =
            x1.path_segments.iter().map(|s| &s.local_name).collect();
        assert_eq!(path, ["top", "x1"]);
    }

    #[test]
    fn config_is_inherited() {
        let mut state = node("container", "state");
        state.config = Some(false);
        let root = with(
            node("module", "m"),
            vec![with(state, vec![node("leaf", "counter")])],
        );
        let out = ParseTreeAdapter::new("m.json").adapt(&root).unwrap();
        assert!(!out[0].is_configurable);
        assert!(!out[0].children[0].is_configurable);
    }

    #[test]
    fn absent_config_defaults_to_false() {
        let root = with(
            node("module", "m"),
            vec![with(node("container", "top"), vec![node("leaf", "x")])],
        );
        let out = ParseTreeAdapter::new("m.json").adapt(&root).unwrap();
        assert!(!out[0].is_configurable);
        assert!(!out[0].children[0].is_configurable);
    }

    #[test]
    fn explicit_config_true_reaches_descendants() {
        let mut top = node("container", "top");
        top.config = Some(true);
        let mut state = node("container", "state");
        state.config = Some(false);
        let root = with(
            node("module", "m"),
            vec![with(
                top,
                vec![node("leaf", "mtu"), with(state, vec![node("leaf", "c")])],
            )],
        );
        let out = ParseTreeAdapter::new("m.json").adapt(&root).unwrap();
        let top = &out[0];
        assert!(top.is_configurable);
        assert!(top.children[0].is_configurable);
        assert!(!top.children[1].is_configurable);
        assert!(!top.children[1].children[0].is_configurable);
    }

    #[test]
    fn deep_trees_fit_a_small_stack() {
        const DEPTH: usize = 1000;

        let handle = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(|| {
                let mut chain = node("leaf", "bottom");
                for _ in 0..DEPTH {
                    chain = with(node("container", "c"), vec![chain]);
                }
                let mut root = with(node("module", "m"), vec![chain]);
                let mut out =
                    ParseTreeAdapter::new("m.json").adapt(&root).unwrap();

                let mut depth = 0;
                let mut current = &out[0];
                while let Some(child) = current.children.first() {
                    depth += 1;
                    current = child;
                }
                assert_eq!(current.path_segments.len(), DEPTH + 1);
                assert_eq!(current.path_segments[DEPTH].local_name, "bottom");

                // Both trees are torn down by hand; dropping them whole
                // would recurse.
                let mut stubs = std::mem::take(&mut root.children);
                while let Some(mut stub) = stubs.pop() {
                    stubs.append(&mut stub.children);
                }
                while let Some(mut adapted) = out.pop() {
                    out.append(&mut adapted.children);
                }
                depth
            })
            .unwrap();
        assert_eq!(handle.join().unwrap(), DEPTH);
    }

    #[test]
    fn missing_name_is_malformed() {
        let mut nameless = node("leaf", "x");
        nameless.name = None;
        let root = with(node("module", "m"), vec![nameless]);
        let err = ParseTreeAdapter::new("m.json").adapt(&root).unwrap_err();
        assert!(matches!(err, Error::MalformedSourceTree { .. }));
    }

    #[test]
    fn missing_module_is_malformed() {
        let mut orphan = node("container", "x");
        orphan.module = None;
        let root = with(node("module", "m"), vec![orphan]);
        assert!(ParseTreeAdapter::new("m.json").adapt(&root).is_err());
    }
}
