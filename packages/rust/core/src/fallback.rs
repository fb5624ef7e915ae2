//! Ordered fallback chains for schema-drifted lookups.
//!
//! A [`FallbackChain`] is a named list of accessors tried in order; the
//! first one that yields a value wins. The step names are kept so the
//! precedence order can be inspected and logged.

use serde_json::{Map, Value};

type Accessor<S, T> = Box<dyn Fn(&S) -> Option<T> + Send + Sync>;

struct Step<S: ?Sized, T> {
    name: &'static str,
    get: Accessor<S, T>,
}

/// Ordered accessors producing one resolved field.
pub struct FallbackChain<S: ?Sized, T> {
    field: &'static str,
    steps: Vec<Step<S, T>>,
}

impl<S: ?Sized, T> FallbackChain<S, T> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            steps: Vec::new(),
        }
    }

    /// Append an accessor with lower precedence than all existing ones.
    pub fn step(
        mut self,
        name: &'static str,
        get: impl Fn(&S) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(Step {
            name,
            get: Box::new(get),
        });
        self
    }

    /// Name of the field this chain resolves.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Step names in precedence order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }

    /// First value any step yields.
    pub fn resolve(&self, source: &S) -> Option<T> {
        self.resolve_traced(source).map(|(_, value)| value)
    }

    /// First value any step yields, with the name of the step that won.
    pub fn resolve_traced(&self, source: &S) -> Option<(&'static str, T)> {
        self.steps
            .iter()
            .find_map(|step| (step.get)(source).map(|value| (step.name, value)))
    }
}

impl<T: 'static> FallbackChain<Map<String, Value>, T> {
    /// Chain over JSON object keys, each read with `read`.
    pub fn keys(field: &'static str, keys: &[&'static str], read: fn(&Value) -> Option<T>) -> Self {
        keys.iter().fold(Self::new(field), |chain, key| {
            let key: &'static str = *key;
            chain.step(key, move |obj: &Map<String, Value>| obj.get(key).and_then(read))
        })
    }
}

impl<S: ?Sized, T> std::fmt::Debug for FallbackChain<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("field", &self.field)
            .field("steps", &self.step_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(v: &Value) -> Option<String> {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    #[test]
    fn first_non_empty_step_wins() {
        let chain = FallbackChain::keys("persona", &["persona", "personaName", "title"], text);
        let obj = json!({ "persona": "  ", "personaName": "Ops lead", "title": "CFO" });
        let obj = obj.as_object().unwrap();

        assert_eq!(chain.resolve_traced(obj), Some(("personaName", "Ops lead".to_string())));
        assert_eq!(chain.step_names(), ["persona", "personaName", "title"]);
    }

    #[test]
    fn empty_chain_resolves_nothing() {
        let chain: FallbackChain<str, usize> = FallbackChain::new("len");
        assert_eq!(chain.resolve("abc"), None);

        let chain = chain.step("len", |s: &str| Some(s.len()));
        assert_eq!(chain.resolve("abc"), Some(3));
        assert_eq!(chain.field(), "len");
    }
}
