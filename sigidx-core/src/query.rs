//! Partial-match query execution: narrow the set of data pages worth
//! scanning using one of three signature-based pruning strategies, then
//! scan exactly those pages for tuples that truly match.

use crate::bits::{BitString, BitsError};
use crate::page::{PageError, PageId};
use crate::relation::{Relation, RelationError};
use crate::tuple::{Tuple, TupleError};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query has {actual} attributes, relation has {expected}")]
    WrongAttrCount { expected: usize, actual: usize },
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    Tuple(#[from] TupleError),
    #[error(transparent)]
    Bits(#[from] BitsError),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Which pruning strategy picks candidate pages before the tuple scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No pruning: scan every data page.
    All,
    /// Prune using the per-tuple signature file.
    TupleSig,
    /// Prune using the per-page signature file.
    PageSig,
    /// Prune using the page-signature bit slices.
    BitSlice,
}

impl Strategy {
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            't' => Some(Self::TupleSig),
            'p' => Some(Self::PageSig),
            'b' => Some(Self::BitSlice),
            'a' => Some(Self::All),
            _ => None,
        }
    }
}

/// Counters accumulated while answering a query: how much signature and
/// tuple data had to be read, and how often a scanned page turned out
/// to hold no match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub nsigpages: u32,
    pub nsigs: u32,
    pub ntuppages: u32,
    pub ntuples: u32,
    pub nfalse: u32,
}

impl std::fmt::Display for QueryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "# sig pages read:    {}", self.nsigpages)?;
        writeln!(f, "# signatures read:   {}", self.nsigs)?;
        writeln!(f, "# data pages read:   {}", self.ntuppages)?;
        writeln!(f, "# tuples examined:   {}", self.ntuples)?;
        write!(f, "# false match pages: {}", self.nfalse)
    }
}

/// The outcome of running a query: the tuples that truly matched, plus
/// the statistics the scan accumulated.
pub struct QueryResult {
    pub matches: Vec<Tuple>,
    pub stats: QueryStats,
}

/// A partial-match query against a relation, parameterized by which
/// pruning strategy selects candidate pages.
pub struct Query;

impl Query {
    /// Runs `query` against `relation` using `strategy`, returning every
    /// tuple that actually matches and the stats the scan accumulated.
    pub fn run(
        relation: &mut Relation,
        query: &Tuple,
        strategy: Strategy,
    ) -> Result<QueryResult, QueryError> {
        if query.nattrs() != relation.params().nattrs as usize {
            return Err(QueryError::WrongAttrCount {
                expected: relation.params().nattrs as usize,
                actual: query.nattrs(),
            });
        }

        log::debug!("relation {:?}: running {strategy:?} query", relation.name());
        let (candidates, mut stats) = match strategy {
            Strategy::All => (all_ones(relation.npages()), QueryStats::default()),
            Strategy::TupleSig => find_pages_using_tuple_sigs(relation, query)?,
            Strategy::PageSig => find_pages_using_page_sigs(relation, query)?,
            Strategy::BitSlice => find_pages_using_bit_slices(relation, query)?,
        };
        log::debug!(
            "relation {:?}: {strategy:?} candidate set read {} signature pages / {} signatures",
            relation.name(),
            stats.nsigpages,
            stats.nsigs
        );

        let mut matches = Vec::new();
        for pid in 0..relation.npages() {
            if !candidates.get(pid as usize) {
                continue;
            }
            log::trace!("relation {:?}: scanning candidate data page {pid}", relation.name());
            let page = relation.get_data_page(pid)?;
            stats.ntuppages += 1;
            let mut nmatch = 0;
            for slot in 0..page.item_count() {
                let tuple = relation.tuple_from_page(&page, slot)?;
                stats.ntuples += 1;
                if tuple.matches(query) {
                    nmatch += 1;
                    matches.push(tuple);
                }
            }
            if nmatch == 0 {
                stats.nfalse += 1;
                log::trace!("relation {:?}: data page {pid} was a false-positive candidate", relation.name());
            }
        }

        Ok(QueryResult { matches, stats })
    }
}

fn all_ones(npages: u32) -> BitString {
    let mut b = BitString::new(npages as usize);
    b.set_all();
    b
}

/// Scans every tuple-signature page; a tuple signature that is a
/// superset of the query signature marks its owning data page as a
/// candidate. Data-page ownership is derived from a running count of
/// tuple signatures seen so far (`nsigs / tup_pp`), since tsigs are
/// packed in insertion order independent of page boundaries.
fn find_pages_using_tuple_sigs(
    relation: &mut Relation,
    query: &Tuple,
) -> Result<(BitString, QueryStats), QueryError> {
    let qsig = relation.tuple_sig(query);
    let mut stats = QueryStats::default();
    let mut candidates = BitString::new(relation.npages() as usize);

    let tsig_size = relation.params().tsig_size as usize;
    let tm = relation.params().tm as usize;
    let tup_pp = relation.params().tup_pp;
    let tsig_npages = relation.params().tsig_npages;

    for tpid in 0..tsig_npages {
        let page = relation.get_tsig_page(tpid)?;
        log::trace!("relation {:?}: read tsig page {tpid}", relation.name());
        stats.nsigpages += 1;
        for i in 0..page.item_count() {
            let tsig = BitString::from_bytes(tm, page.get_item(i, tsig_size)?)?;
            if qsig.is_subset_of(&tsig) {
                let dpid = stats.nsigs / tup_pp;
                candidates.set(dpid as usize);
            }
            stats.nsigs += 1;
        }
    }

    Ok((candidates, stats))
}

/// Scans every page-signature page; a page signature that is a
/// superset of the query signature marks that page directly, since
/// page signatures are stored one per data page in data-page order.
fn find_pages_using_page_sigs(
    relation: &mut Relation,
    query: &Tuple,
) -> Result<(BitString, QueryStats), QueryError> {
    let qsig = relation.page_sig(query);
    let mut stats = QueryStats::default();
    let mut candidates = BitString::new(relation.npages() as usize);

    let psig_size = relation.params().psig_size as usize;
    let pm = relation.params().pm as usize;
    let psig_npages = relation.params().psig_npages;

    for ppid in 0..psig_npages {
        let page = relation.get_psig_page(ppid)?;
        log::trace!("relation {:?}: read psig page {ppid}", relation.name());
        stats.nsigpages += 1;
        for i in 0..page.item_count() {
            let psig = BitString::from_bytes(pm, page.get_item(i, psig_size)?)?;
            if qsig.is_subset_of(&psig) {
                candidates.set(stats.nsigs as usize);
            }
            stats.nsigs += 1;
        }
    }

    Ok((candidates, stats))
}

/// Starts from "every page is a candidate" and ANDs that down: for each
/// bit set in the query's page signature, reads the corresponding
/// bit-slice row and drops every data page whose bit in that row is 0.
/// A page survives only if it's consistent with every query bit.
fn find_pages_using_bit_slices(
    relation: &mut Relation,
    query: &Tuple,
) -> Result<(BitString, QueryStats), QueryError> {
    let qsig = relation.page_sig(query);
    let mut stats = QueryStats::default();
    let mut candidates = all_ones(relation.npages());

    let bsig_size = relation.params().bsig_size as usize;
    let bm = relation.params().bm as usize;
    let bsig_pp = relation.params().bsig_pp;
    let pm = relation.params().pm as usize;
    let npages = relation.npages();

    let mut cur_bsig_pid: Option<PageId> = None;
    let mut bsig_page = None;
    for i in 0..pm {
        if !qsig.get(i) {
            continue;
        }
        let pid = i as u32 / bsig_pp;
        if cur_bsig_pid != Some(pid) {
            bsig_page = Some(relation.get_bsig_page(pid)?);
            cur_bsig_pid = Some(pid);
            stats.nsigpages += 1;
            log::trace!("relation {:?}: read bsig page {pid}", relation.name());
        }
        stats.nsigs += 1;
        let page = bsig_page.as_ref().expect("just populated above");
        let row = i as u32 % bsig_pp;
        let bsig = BitString::from_bytes(bm, page.get_item(row, bsig_size)?)?;
        for j in 0..npages {
            if (j as usize) < bsig.nbits() && !bsig.get(j as usize) {
                candidates.clear(j as usize);
            }
        }
    }

    Ok((candidates, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::SigType;

    fn in_temp_dir<T>(f: impl FnOnce() -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = f();
        std::env::set_current_dir(prev).unwrap();
        result
    }

    fn sample_relation(name: &str) -> Relation {
        let mut r = Relation::create(name, 2, 1.0, 16, SigType::Simc, 4, 64, 128, 64).unwrap();
        for (a, b) in [("waterloo", "1"), ("kitchener", "2"), ("waterloo", "3")] {
            let t = Tuple::parse(&format!("{a},{b}"), 2).unwrap();
            r.insert(&t).unwrap();
        }
        r
    }

    #[test]
    fn all_strategy_scans_every_page_and_finds_every_match() {
        in_temp_dir(|| {
            let mut r = sample_relation("q1");
            let query = Tuple::parse("waterloo,?", 2).unwrap();
            let result = Query::run(&mut r, &query, Strategy::All).unwrap();
            assert_eq!(result.matches.len(), 2);
            assert_eq!(result.stats.ntuples, 3);
        });
    }

    #[test]
    fn tuple_sig_strategy_never_misses_a_real_match() {
        in_temp_dir(|| {
            let mut r = sample_relation("q2");
            let query = Tuple::parse("waterloo,?", 2).unwrap();
            let all = Query::run(&mut r, &query, Strategy::All).unwrap();
            let pruned = Query::run(&mut r, &query, Strategy::TupleSig).unwrap();
            assert_eq!(all.matches.len(), pruned.matches.len());
        });
    }

    #[test]
    fn page_sig_strategy_never_misses_a_real_match() {
        in_temp_dir(|| {
            let mut r = sample_relation("q3");
            let query = Tuple::parse("?,2", 2).unwrap();
            let all = Query::run(&mut r, &query, Strategy::All).unwrap();
            let pruned = Query::run(&mut r, &query, Strategy::PageSig).unwrap();
            assert_eq!(all.matches.len(), pruned.matches.len());
        });
    }

    #[test]
    fn bit_slice_strategy_never_misses_a_real_match() {
        in_temp_dir(|| {
            let mut r = sample_relation("q4");
            let query = Tuple::parse("waterloo,?", 2).unwrap();
            let all = Query::run(&mut r, &query, Strategy::All).unwrap();
            let pruned = Query::run(&mut r, &query, Strategy::BitSlice).unwrap();
            assert_eq!(all.matches.len(), pruned.matches.len());
        });
    }

    #[test]
    fn wrong_attribute_count_is_rejected() {
        in_temp_dir(|| {
            let mut r = sample_relation("q5");
            let query = Tuple::parse("waterloo", 1).unwrap();
            assert!(matches!(
                Query::run(&mut r, &query, Strategy::All),
                Err(QueryError::WrongAttrCount { .. })
            ));
        });
    }
}
