use crate::parse_tree::PathSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualification {
    /// Every segment rendered as `module:local`.
    Qualified,
    /// A segment is prefixed only when its prefix differs from the previous
    /// segment's. With `resolve_to_module` the module name stands in for the
    /// declared prefix.
    Unqualified { resolve_to_module: bool },
}

pub fn render(segments: &[PathSegment], mode: Qualification) -> String {
    let mut out = String::new();
    let mut previous: Option<&str> = None;

    for segment in segments {
        out.push('/');
        match mode {
            Qualification::Qualified => {
                out.push_str(&segment.module);
                out.push(':');
            }
            Qualification::Unqualified { resolve_to_module } => {
                let prefix = if resolve_to_module {
                    segment.module.as_str()
                } else {
                    segment.prefix.as_str()
                };
                if previous != Some(prefix) {
                    out.push_str(prefix);
                    out.push(':');
                }
                previous = Some(prefix);
            }
        }
        out.push_str(&segment.local_name);
    }
    out
}

/// Globally unique identity of a YANG data path.
pub fn machine_id(segments: &[PathSegment]) -> String {
    render(segments, Qualification::Qualified)
}

/// Readable form shown to users.
pub fn human_id(segments: &[PathSegment]) -> String {
    render(
        segments,
        Qualification::Unqualified {
            resolve_to_module: true,
        },
    )
}
