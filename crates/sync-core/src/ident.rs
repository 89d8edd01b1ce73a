//! SQL identifiers that are safe to interpolate into statements.
//!
//! Values are always bound as parameters. Table and column names cannot be
//! bound, so they pass through [`Identifier`], which rejects names no database
//! could hold and escapes the quote character when quoting. Table names also
//! pass through an [`IdentifierAllowList`] derived from the catalog, so only
//! tables the manifest names are ever touched.

use std::collections::BTreeSet;

use crate::PipelineError;

/// MySQL and PostgreSQL both cap identifiers at 64 and 63 bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A table or column name: non-empty, at most 63 bytes, no control characters
/// and no leading or trailing whitespace.
///
/// Names such as `RF_CO2$PPM` or `RF_TEMP#2` are valid; they are always
/// emitted quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: &str) -> Result<Self, PipelineError> {
        let valid = !name.is_empty()
            && name.len() <= MAX_IDENTIFIER_LEN
            && name.trim() == name
            && !name.chars().any(char::is_control);
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(PipelineError::InvalidIdentifier(name.escape_debug().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backtick-quoted form for MySQL statements.
    pub fn mysql(&self) -> String {
        format!("`{}`", self.0.replace('`', "``"))
    }

    /// Double-quoted, lowercased form for PostgreSQL statements.
    ///
    /// Lowercasing matches how PostgreSQL folds unquoted names, so catalog
    /// names written in upper case still resolve.
    pub fn postgres(&self) -> String {
        format!("\"{}\"", self.0.to_lowercase().replace('"', "\"\""))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Set of table names the pipeline is allowed to touch.
#[derive(Debug, Clone, Default)]
pub struct IdentifierAllowList {
    tables: BTreeSet<String>,
}

impl IdentifierAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table name (compared case-insensitively).
    pub fn allow(&mut self, table: &str) {
        self.tables.insert(table.to_lowercase());
    }

    pub fn with(mut self, table: &str) -> Self {
        self.allow(table);
        self
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(&table.to_lowercase())
    }

    /// Validate a table name against the character rules and the allow-list.
    pub fn table(&self, table: &str) -> Result<Identifier, PipelineError> {
        let ident = Identifier::new(table)?;
        if self.contains(table) {
            Ok(ident)
        } else {
            Err(PipelineError::InvalidIdentifier(table.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(Identifier::new("rf_ahur_temp_1").is_ok());
        assert!(Identifier::new("RF_CO2$PPM").is_ok());
        assert!(Identifier::new("RF_TEMP#2").is_ok());
        assert!(Identifier::new("rf-fan-speed").is_ok());
        assert!(Identifier::new("").is_err());
        assert!(Identifier::new(" rf_temp").is_err());
        assert!(Identifier::new("rf\ntemp").is_err());
        assert!(Identifier::new("rf\0temp").is_err());
        assert!(Identifier::new(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_quoting() {
        let ident = Identifier::new("RF_Temp").unwrap();
        assert_eq!(ident.mysql(), "`RF_Temp`");
        assert_eq!(ident.postgres(), "\"rf_temp\"");

        let odd = Identifier::new("RF_CO2$PPM").unwrap();
        assert_eq!(odd.mysql(), "`RF_CO2$PPM`");
        assert_eq!(odd.postgres(), "\"rf_co2$ppm\"");
    }

    #[test]
    fn test_quote_characters_are_doubled() {
        let ident = Identifier::new("a`b\"c").unwrap();
        assert_eq!(ident.mysql(), "`a``b\"c`");
        assert_eq!(ident.postgres(), "\"a`b\"\"c\"");

        let injection = Identifier::new("t`; DROP TABLE x; --").unwrap();
        assert_eq!(injection.mysql(), "`t``; DROP TABLE x; --`");
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let allow = IdentifierAllowList::new().with("RF_TEMP");
        assert!(allow.table("rf_temp").is_ok());
        assert!(allow.table("Rf_Temp").is_ok());
        assert!(matches!(
            allow.table("rf_other"),
            Err(PipelineError::InvalidIdentifier(_))
        ));
    }
}
