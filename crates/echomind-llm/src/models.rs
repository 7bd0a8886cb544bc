/// Which models callers may request and which `/models` may advertise.
///
/// An empty allowlist permits everything.
#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    allowed: Vec<String>,
}

impl ModelCatalog {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn permits(&self, model: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|m| m == model)
    }

    /// Keep only permitted models, preserving backend order.
    pub fn filter(&self, models: Vec<String>) -> Vec<String> {
        models.into_iter().filter(|m| self.permits(m)).collect()
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}
