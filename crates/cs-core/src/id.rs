use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global string interner for logical and canvas ids: fast comparisons, low memory.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

fn next_serial() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of a logical node in incoming data (often a spreadsheet row id).
/// Internally a `Spur` index: 4 bytes, Copy, Eq, Hash in O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Spur);

impl NodeId {
    /// Intern a new string as a NodeId, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        NodeId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }
}

/// Identifier of a widget living on the canvas. Assigned by the canvas.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(Spur);

impl WidgetId {
    pub fn intern(s: &str) -> Self {
        WidgetId(INTERNER.get_or_intern(s))
    }

    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Generate a unique id with a kind prefix (e.g. `shape_1`, `frame_2`).
    pub fn with_prefix(prefix: &str) -> Self {
        Self::intern(&format!("{prefix}_{}", next_serial()))
    }
}

macro_rules! interned_serde {
    ($ty:ident, $sigil:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($sigil, "{}"), self.as_str())
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok($ty::intern(&s))
            }
        }
    };
}

interned_serde!(NodeId, "@");
interned_serde!(WidgetId, "#");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = NodeId::intern("row_17");
        let b = NodeId::intern("row_17");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "row_17");
        assert_eq!(format!("{a:?}"), "@row_17");
    }

    #[test]
    fn prefixed_widget_ids_are_unique() {
        let a = WidgetId::with_prefix("shape");
        let b = WidgetId::with_prefix("shape");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("shape_"));
    }
}
