//! Tests for the computation registry

use calculator_dispatch::core::{sum_math_cos, DispatchError, ModelRegistry};

#[test]
fn test_default_models() {
    let registry = ModelRegistry::with_defaults();
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["sum_math_cos"]);
    let out = registry.evaluate("sum_math_cos", 0.0).unwrap();
    assert!((out - 1_000_000.0).abs() < 1e-6);
}

#[test]
fn test_sum_math_cos_is_deterministic() {
    assert_eq!(sum_math_cos(3.0).to_bits(), sum_math_cos(3.0).to_bits());
}

#[test]
fn test_unknown_model_lists_available() {
    let registry = ModelRegistry::with_defaults().with_model("square", |x| Ok(x * x));
    match registry.evaluate("cube", 2.0) {
        Err(DispatchError::UnknownModel { name, available }) => {
            assert_eq!(name, "cube");
            assert_eq!(available, "square,sum_math_cos");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_infinite_output_is_a_computation_error() {
    let registry = ModelRegistry::new().with_model("reciprocal", |x| Ok(1.0 / x));
    assert!((registry.evaluate("reciprocal", 4.0).unwrap() - 0.25).abs() < f64::EPSILON);
    assert!(matches!(
        registry.evaluate("reciprocal", 0.0),
        Err(DispatchError::Computation(_))
    ));
}
