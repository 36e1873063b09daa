//! Checks run before a receive opens its target.

/// Verdict of a pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// Allow, but open this path instead. Existence is still decided on the
    /// requested path.
    Redirect(String),
    Deny(String),
}

/// A collaborator consulted before a receive is started.
pub trait Preflight: Send + Sync {
    fn admit(&self, path: &str) -> Admission;
}

/// Runs several checks in order. The first denial wins; otherwise the last
/// redirect wins.
#[derive(Default)]
pub struct PreflightChain {
    checks: Vec<Box<dyn Preflight>>,
}

impl PreflightChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: impl Preflight + 'static) {
        self.checks.push(Box::new(check));
    }

    pub fn with(mut self, check: impl Preflight + 'static) -> Self {
        self.push(check);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Preflight for PreflightChain {
    fn admit(&self, path: &str) -> Admission {
        let mut target = None;
        for check in &self.checks {
            match check.admit(path) {
                Admission::Allow => {}
                Admission::Redirect(to) => target = Some(to),
                deny @ Admission::Deny(_) => return deny,
            }
        }
        target.map_or(Admission::Allow, Admission::Redirect)
    }
}
