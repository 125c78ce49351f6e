//! Query expansion applied before a query enters the retrieval core

use super::RetrievalError;

/// Rewrites a raw query into the text that is actually retrieved with,
/// for example a hypothetical answer passage generated by a language model.
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str) -> Result<String, RetrievalError>;
}

/// Leaves queries unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityExpander;

impl QueryExpander for IdentityExpander {
    fn expand(&self, query: &str) -> Result<String, RetrievalError> {
        Ok(query.to_string())
    }
}

/// Expander backed by a closure
pub struct FnExpander<F>(F);

impl<F> FnExpander<F>
where
    F: Fn(&str) -> Result<String, RetrievalError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> QueryExpander for FnExpander<F>
where
    F: Fn(&str) -> Result<String, RetrievalError> + Send + Sync,
{
    fn expand(&self, query: &str) -> Result<String, RetrievalError> {
        (self.0)(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(IdentityExpander.expand("oxygen").unwrap(), "oxygen");
    }

    #[test]
    fn test_closure_expander() {
        let expander = FnExpander::new(|q: &str| Ok(format!("{} recycling systems", q)));
        assert_eq!(
            expander.expand("oxygen").unwrap(),
            "oxygen recycling systems"
        );

        let failing = FnExpander::new(|_: &str| {
            Err(RetrievalError::Expansion("model unavailable".to_string()))
        });
        assert!(failing.expand("oxygen").is_err());
    }
}
