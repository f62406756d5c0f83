//! Class definitions.

use serde::{Deserialize, Serialize};

use obase_types::{AttrId, BaseType, ClassId, Scalar, StoredValue, Value};

/// Domain of an atom class: a base type and optional inclusive bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtomSpec {
    pub base: BaseType,
    pub inf: Option<StoredValue>,
    pub sup: Option<StoredValue>,
}

impl AtomSpec {
    /// An unbounded domain over `base`.
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            inf: None,
            sup: None,
        }
    }

    /// A domain over `base` bounded by `inf` and `sup` (both inclusive).
    ///
    /// Bounds must be of the base type, and `inf` must not exceed `sup`.
    pub fn bounded(base: BaseType, inf: Option<&Value>, sup: Option<&Value>) -> Result<Self, String> {
        let unbounded = Self::new(base);
        let inf = inf.map(|v| unbounded.coerce(v)).transpose()?;
        let sup = sup.map(|v| unbounded.coerce(v)).transpose()?;
        if let (Some(lo), Some(hi)) = (&inf, &sup) {
            if Scalar::from(lo) > Scalar::from(hi) {
                return Err(format!("lower bound {lo} exceeds upper bound {hi}"));
            }
        }
        Ok(Self { base, inf, sup })
    }

    /// Convert a non-null host value into its stored form, checking the base
    /// type and the bounds. Integers widen to reals.
    pub fn coerce(&self, value: &Value) -> Result<StoredValue, String> {
        let stored = match (self.base, value) {
            (BaseType::Int, Value::Int(v)) => StoredValue::Int(*v),
            (BaseType::Real, Value::Real(v)) => StoredValue::Real(*v),
            (BaseType::Real, Value::Int(v)) => StoredValue::Real(*v as f64),
            (BaseType::Time, Value::Time(v)) => StoredValue::Time(*v),
            (BaseType::String, Value::Str(v)) => StoredValue::Str(v.clone()),
            (base, other) => {
                return Err(format!("expected {base}, got {}", other.kind_name()));
            }
        };

        let scalar = Scalar::from(&stored);
        if let Some(inf) = &self.inf {
            if scalar < Scalar::from(inf) {
                return Err(format!("{stored} is below the lower bound {inf}"));
            }
        }
        if let Some(sup) = &self.sup {
            if scalar > Scalar::from(sup) {
                return Err(format!("{stored} is above the upper bound {sup}"));
            }
        }
        Ok(stored)
    }
}

/// The structural role of a class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClassKind {
    /// A scalar domain.
    Atom(AtomSpec),
    /// A record type; `state` is its hidden state attribute.
    Tuple { state: AttrId },
}

/// A registered class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: String,
    pub kind: ClassKind,
    /// Immediate superclass; only tuple classes specialize.
    pub super_class: Option<ClassId>,
}

impl ClassDef {
    pub fn is_atom(&self) -> bool {
        matches!(self.kind, ClassKind::Atom(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self.kind, ClassKind::Tuple { .. })
    }

    pub fn is_sub(&self) -> bool {
        self.super_class.is_some()
    }

    pub fn atom(&self) -> Option<&AtomSpec> {
        match &self.kind {
            ClassKind::Atom(spec) => Some(spec),
            ClassKind::Tuple { .. } => None,
        }
    }

    /// The hidden state attribute, if this is a tuple class.
    pub fn state_attribute(&self) -> Option<AttrId> {
        match self.kind {
            ClassKind::Tuple { state } => Some(state),
            ClassKind::Atom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_checks_base_type() {
        let spec = AtomSpec::new(BaseType::String);
        assert_eq!(spec.coerce(&Value::from("a")).unwrap(), StoredValue::Str("a".into()));
        let err = spec.coerce(&Value::Int(1)).unwrap_err();
        assert!(err.contains("expected String"));
    }

    #[test]
    fn ints_widen_to_reals() {
        let spec = AtomSpec::new(BaseType::Real);
        assert_eq!(spec.coerce(&Value::Int(2)).unwrap(), StoredValue::Real(2.0));
    }

    #[test]
    fn bounds_are_inclusive() {
        let spec =
            AtomSpec::bounded(BaseType::Int, Some(&Value::Int(1)), Some(&Value::Int(10))).unwrap();
        assert!(spec.coerce(&Value::Int(1)).is_ok());
        assert!(spec.coerce(&Value::Int(10)).is_ok());
        assert!(spec.coerce(&Value::Int(0)).unwrap_err().contains("below"));
        assert!(spec.coerce(&Value::Int(11)).unwrap_err().contains("above"));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let err = AtomSpec::bounded(BaseType::Real, Some(&Value::Real(2.0)), Some(&Value::Real(1.0)))
            .unwrap_err();
        assert!(err.contains("exceeds"));
    }

    #[test]
    fn bound_of_wrong_type_rejected() {
        assert!(AtomSpec::bounded(BaseType::Int, Some(&Value::from("a")), None).is_err());
    }
}
