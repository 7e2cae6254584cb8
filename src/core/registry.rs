//! Computation registry: model name to pure compute function.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::DispatchError;

/// A pure, deterministic compute function over one float.
pub type ComputeFn = Arc<dyn Fn(f64) -> Result<f64, String> + Send + Sync>;

/// Static table of compute functions, populated at startup.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ComputeFn>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in models.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().with_model("sum_math_cos", |num| Ok(sum_math_cos(num)))
    }

    /// Add (or replace) a model.
    #[must_use]
    pub fn with_model<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(f64) -> Result<f64, String> + Send + Sync + 'static,
    {
        self.models.insert(name.into(), Arc::new(f));
        self
    }

    /// Registered model names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Look up a model by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` listing the available names.
    pub fn resolve(&self, name: &str) -> Result<ComputeFn, DispatchError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownModel {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(","),
            })
    }

    /// Resolve and run a model, containing any fault.
    ///
    /// # Errors
    ///
    /// `UnknownModel` for an unregistered name; `Computation` when the
    /// function reports an error, panics, or yields a non-finite value.
    pub fn evaluate(&self, name: &str, input: f64) -> Result<f64, DispatchError> {
        let f = self.resolve(name)?;
        let outcome = catch_unwind(AssertUnwindSafe(|| f(input)))
            .map_err(|panic| DispatchError::Computation(panic_message(&*panic)))?;
        match outcome {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(v) => Err(DispatchError::Computation(format!(
                "model {name} produced non-finite output {v}"
            ))),
            Err(msg) => Err(DispatchError::Computation(msg)),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "compute function panicked".to_string())
}

/// Sum of `cos(i * num * pi)` for `i` in `0..1_000_000`.
#[must_use]
pub fn sum_math_cos(num: f64) -> f64 {
    (0..1_000_000u32)
        .map(|i| (f64::from(i) * num * PI).cos())
        .sum()
}
