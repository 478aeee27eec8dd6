use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::traits::MetaObject;

/// Identity of a table. This is the parent key of every table-scoped cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableRef {
    pub schema:    String,
    pub name:      String,
    pub object_id: i64,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, object_id: i64) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            object_id,
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableColumn {
    pub name:             String,
    pub object_id:        i64,
    /// Display order of the column within its table.
    pub ordinal_position: u32,
    pub data_type:        String,
    pub nullable:         bool,
    /// Hidden columns are system maintained and never copied into a new table.
    pub hidden:           bool,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, object_id: i64, ordinal_position: u32, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_id,
            ordinal_position,
            data_type: data_type.into(),
            nullable: true,
            hidden: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableIndex {
    pub name:      String,
    pub object_id: i64,
    pub unique:    bool,
    pub columns:   Vec<String>,
}

/// Primary key or unique constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UniqueKey {
    pub name:      String,
    pub object_id: i64,
    pub primary:   bool,
    pub columns:   Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CheckConstraint {
    pub name:       String,
    pub object_id:  i64,
    pub definition: String,
}

/// Options of DDL generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct DdlOptions {
    /// Drop the memoized text and generate it anew.
    pub refresh:          bool,
    pub include_comments: bool,
}

impl DdlOptions {
    pub fn refreshed() -> Self {
        Self {
            refresh: true,
            ..Default::default()
        }
    }
}

macro_rules! meta_object {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl MetaObject for $ty {
                fn name(&self) -> &str {
                    &self.name
                }

                fn object_id(&self) -> i64 {
                    self.object_id
                }
            }
        )+
    };
}

meta_object!(TableColumn, TableIndex, UniqueKey, CheckConstraint);
