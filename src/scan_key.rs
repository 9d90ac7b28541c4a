//! Scan keys: one predicate atom `column <op> argument` bound to a scan.

use crate::compare;
use crate::error::MiniError;
use crate::types::{type_width, Strategy};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct ScanKey {
    /// Table or index column number; 0 addresses the rowid.
    pub attno: i16,
    pub strategy: Strategy,
    pub type_oid: u32,
    pub argument: Vec<u8>,
}

impl ScanKey {
    pub fn new(attno: i16, strategy: Strategy, type_oid: u32, argument: Vec<u8>) -> ScanKey {
        ScanKey {
            attno,
            strategy,
            type_oid,
            argument,
        }
    }

    /// Runs the typed comparator as `cmp(argument, column)`.
    pub fn compare(&self, column: &[u8]) -> Result<Ordering, MiniError> {
        let cmp = compare::cmp_fn(self.type_oid).ok_or_else(|| {
            MiniError::Invalid(format!("type {} has no ordering", self.type_oid))
        })?;
        let width = type_width(self.type_oid).unwrap_or(0);
        if self.argument.len() != width || column.len() != width {
            return Err(MiniError::Corrupt(format!(
                "scan key width mismatch for type {}: argument {}, column {}",
                self.type_oid,
                self.argument.len(),
                column.len()
            )));
        }
        Ok(cmp(&self.argument, column))
    }

    /// Interprets the comparator result under this key's strategy. Note the
    /// comparator puts the argument first, so e.g. `<` is satisfied when the
    /// argument compares greater than the column.
    pub fn satisfies(&self, column: &[u8]) -> Result<bool, MiniError> {
        let ord = self.compare(column)?;
        Ok(match self.strategy {
            Strategy::Less => ord == Ordering::Greater,
            Strategy::LessEqual => ord != Ordering::Less,
            Strategy::Equal => ord == Ordering::Equal,
            Strategy::GreaterEqual => ord != Ordering::Greater,
            Strategy::Greater => ord == Ordering::Less,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{INT8_OID, TEXT_OID};

    fn key(strategy: Strategy, argument: i64) -> ScanKey {
        ScanKey::new(1, strategy, INT8_OID, argument.to_le_bytes().to_vec())
    }

    #[test]
    fn test_compare_sign() -> Result<(), MiniError> {
        let k = key(Strategy::Equal, 10);
        assert_eq!(k.compare(&5i64.to_le_bytes())?, Ordering::Greater);
        assert_eq!(k.compare(&10i64.to_le_bytes())?, Ordering::Equal);
        assert_eq!(k.compare(&15i64.to_le_bytes())?, Ordering::Less);
        Ok(())
    }

    #[test]
    fn test_satisfies_all_strategies() -> Result<(), MiniError> {
        // column < 10
        let k = key(Strategy::Less, 10);
        assert!(k.satisfies(&9i64.to_le_bytes())?);
        assert!(!k.satisfies(&10i64.to_le_bytes())?);
        assert!(!k.satisfies(&11i64.to_le_bytes())?);

        // column <= 10
        let k = key(Strategy::LessEqual, 10);
        assert!(k.satisfies(&9i64.to_le_bytes())?);
        assert!(k.satisfies(&10i64.to_le_bytes())?);
        assert!(!k.satisfies(&11i64.to_le_bytes())?);

        // column == 10
        let k = key(Strategy::Equal, 10);
        assert!(!k.satisfies(&9i64.to_le_bytes())?);
        assert!(k.satisfies(&10i64.to_le_bytes())?);
        assert!(!k.satisfies(&11i64.to_le_bytes())?);

        // column >= 10
        let k = key(Strategy::GreaterEqual, 10);
        assert!(!k.satisfies(&9i64.to_le_bytes())?);
        assert!(k.satisfies(&10i64.to_le_bytes())?);
        assert!(k.satisfies(&11i64.to_le_bytes())?);

        // column > 10
        let k = key(Strategy::Greater, 10);
        assert!(!k.satisfies(&10i64.to_le_bytes())?);
        assert!(k.satisfies(&11i64.to_le_bytes())?);
        Ok(())
    }

    #[test]
    fn test_rejects_unorderable_type() {
        let k = ScanKey::new(1, Strategy::Equal, TEXT_OID, b"abc".to_vec());
        assert!(matches!(k.compare(b"abc"), Err(MiniError::Invalid(_))));
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let k = key(Strategy::Equal, 10);
        assert!(matches!(
            k.compare(&3i16.to_le_bytes()),
            Err(MiniError::Corrupt(_))
        ));
    }
}
