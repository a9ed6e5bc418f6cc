use std::collections::HashMap;

/// Shell-local variables set with `set` and read back through `$name`.
///
/// This namespace is separate from the process environment: nothing is
/// inherited at startup and nothing is exported to children. Names are
/// expected to be non-empty and free of `=` and whitespace; the store itself
/// does not validate them.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: HashMap<String, String>,
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a variable, if it is bound.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set or overwrite a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Remove a variable. Unsetting an unbound name is not an error.
    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over all bindings in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
