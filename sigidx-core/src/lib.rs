//! Superimposed-coding signature index over a paged heap file.
//!
//! A relation is five files on disk: a heap of fixed-width tuples, and
//! three parallel signature files (per-tuple, per-page, and bit-sliced)
//! that let a partial-match query prune the set of data pages it has to
//! scan. See [`relation`] for the entry point and [`query`] for the three
//! pruning strategies.

pub mod bits;
pub mod codeword;
pub mod hash;
pub mod page;
pub mod query;
pub mod relation;
pub mod sig;
pub mod tuple;

pub use bits::{BitString, BitsError};
pub use page::{Page, PageError, PageId, PagedFile, PAGESIZE};
pub use query::{Query, QueryError, QueryResult, QueryStats, Strategy};
pub use relation::{Relation, RelationError, RelnParams};
pub use sig::SigType;
pub use tuple::{Tuple, TupleError, WILDCARD};
