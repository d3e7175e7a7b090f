//! Diagnostic output contract.
//!
//! The one-line stderr format is load-bearing: downstream tooling parses it
//! line by line, so it is rendered here and nowhere else.

/// One unmet peer constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The dependency declaring the peer constraint.
    pub owner: String,
    /// The package the constraint targets.
    pub peer: String,
    /// The range the owner requires of the peer.
    pub required_range: String,
    /// The project's own declared range for the peer, when it has one.
    pub declared_range: Option<String>,
    /// Whether any published version of the peer could satisfy the
    /// requirement. Only known when the peer is a declared dependency.
    pub satisfiable: Option<bool>,
}

impl Diagnostic {
    /// The stderr line. Format is a stable contract.
    #[must_use]
    pub fn error_line(&self) -> String {
        format!(
            "A dependency satisfying {}'s peerDependency of '{}@{}' was not found!",
            self.owner, self.peer, self.required_range
        )
    }

    /// The informational stdout lines, present only when the peer is itself
    /// a declared dependency.
    #[must_use]
    pub fn info_lines(&self) -> Vec<String> {
        match (&self.declared_range, self.satisfiable) {
            (Some(declared), Some(satisfiable)) => vec![
                format!("Current: {}@{declared}", self.peer),
                format!(
                    "Package dependencies can satisfy the peerDependency? {}",
                    if satisfiable { "Yes" } else { "No" }
                ),
            ],
            _ => Vec::new(),
        }
    }
}
