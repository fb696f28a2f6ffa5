/// Leaf field kinds (§3.1). Kinds that carry a declared size/precision keep
/// it inline instead of as sidecar `Field` attributes, since the kind alone
/// must be enough to pick a cast or storage column type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Unsigned,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Char { len: u32 },
    VarString { len: u32 },
    Text,
    Boolean,
    Date,
    Time,
    /// `timestamp`, always timezone-aware per §3.1.
    Timestamp,
    Binary,
    List,
    Json,
    /// Opaque primary-key bearer; may be auto-incremented (§3.4).
    Primary,
    /// Unresolved type, the identity element of type-join (§3.2).
    Expr,
}

impl FieldKind {
    /// Whether a field of this kind may carry `autoInc` (§3.4: numeric or
    /// identity kind, scalar primary only).
    pub fn supports_auto_increment(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer | FieldKind::Unsigned | FieldKind::BigInt | FieldKind::Primary
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer
                | FieldKind::Unsigned
                | FieldKind::BigInt
                | FieldKind::Float
                | FieldKind::Double
                | FieldKind::Decimal { .. }
        )
    }

    pub fn is_string_like(&self) -> bool {
        matches!(self, FieldKind::Char { .. } | FieldKind::VarString { .. } | FieldKind::Text)
    }

    /// Structural kinds whose column stores a nested document a dotted path
    /// can traverse into (§4.5 field-path lowering).
    pub fn is_structural(&self) -> bool {
        matches!(self, FieldKind::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_primary_forbids_auto_inc_kind_check() {
        assert!(FieldKind::Integer.supports_auto_increment());
        assert!(!FieldKind::Text.supports_auto_increment());
    }
}
