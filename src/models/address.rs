use std::fmt::{self, Display};

use alloy::primitives::Address;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;

/// An address as stored in the catalog: EIP-55 checksummed text.
///
/// Every write goes through this type, so equality on the text column is equality on the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub struct DbAddress {
    pub value: Address,
}

impl DbAddress {
    pub const fn new(value: Address) -> Self {
        Self { value }
    }
}

impl From<Address> for DbAddress {
    fn from(value: Address) -> Self {
        Self::new(value)
    }
}

impl Display for DbAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl ToSql<Text, Sqlite> for DbAddress {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.value.to_checksum(None));
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for DbAddress {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        let value = text
            .parse::<Address>()
            .map_err(|e| format!("Unrecognized address {text:?}: {e}"))?;
        Ok(Self::new(value))
    }
}
