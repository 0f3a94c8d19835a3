//! A relation: five files on disk (tuple data, tuple signatures, page
//! signatures, and the page-signature bit slices, plus a small info
//! file recording the static and dynamic parameters) that together let
//! a partial-match query prune which data pages it has to scan.

use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::mem::size_of;
use std::path::PathBuf;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::bits::{BitString, BitsError};
use crate::page::{Page, PageError, PageId, PagedFile, PAGESIZE};
use crate::sig::{sig_for_tag, SigType};
use crate::tuple::{Tuple, TupleError};

#[derive(Debug, thiserror::Error)]
pub enum RelationError {
    #[error("relation {name:?} already exists")]
    AlreadyExists { name: String },
    #[error("relation {name:?} does not exist")]
    NotFound { name: String },
    #[error("page signature length too small: fewer than 2 signatures fit per page")]
    TooFewPsigSlots,
    #[error("bit-slice signature length too small: fewer than 2 slices fit per page")]
    TooFewBsigSlots,
    #[error("info file is corrupt or from an incompatible build")]
    CorruptInfo,
    #[error("tuple has {actual} attributes, relation has {expected}")]
    WrongAttrCount { expected: usize, actual: usize },
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Tuple(#[from] TupleError),
    #[error(transparent)]
    Bits(#[from] BitsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Static and dynamic parameters of a relation, persisted verbatim as
/// the `.info` file via `zerocopy` so opening a relation is a single
/// fixed-size read with no parsing step.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RelnParams {
    pub nattrs: u32,
    /// Target data-pages-per-page-signature. Informational only: it
    /// documents the ratio the relation was sized for but isn't read
    /// back by `create`/`insert`/`Query` — the source's own `pF` is the
    /// same dead-informational field, never consulted once `psigPP` is
    /// derived from `pm`.
    pub pf: f32,
    /// ASCII tag for the signature scheme (`'s'` or `'c'`), stored as a
    /// full word to keep every field here 4-byte aligned.
    pub sigtype: u32,
    pub tupsize: u32,
    pub tup_pp: u32,
    /// Bits set per attribute codeword under `simc` coding.
    pub tk: u32,
    pub tm: u32,
    pub tsig_size: u32,
    pub tsig_pp: u32,
    pub pm: u32,
    pub psig_size: u32,
    pub psig_pp: u32,
    pub bm: u32,
    pub bsig_size: u32,
    pub bsig_pp: u32,
    pub npages: u32,
    pub ntups: u32,
    pub tsig_npages: u32,
    pub ntsigs: u32,
    pub psig_npages: u32,
    pub npsigs: u32,
    pub bsig_npages: u32,
    pub nbsigs: u32,
}

impl fmt::Display for RelnParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sig_name = if self.sigtype == 'c' as u32 { "catc" } else { "simc" };
        writeln!(f, "Global Info:")?;
        writeln!(f, "Dynamic:")?;
        writeln!(
            f,
            "  #items:  tuples: {}  tsigs: {}  psigs: {}  bsigs: {}",
            self.ntups, self.ntsigs, self.npsigs, self.nbsigs
        )?;
        writeln!(
            f,
            "  #pages:  tuples: {}  tsigs: {}  psigs: {}  bsigs: {}",
            self.npages, self.tsig_npages, self.psig_npages, self.bsig_npages
        )?;
        writeln!(f, "Static:")?;
        writeln!(
            f,
            "  tups   #attrs: {}  size: {} bytes  max/page: {}",
            self.nattrs, self.tupsize, self.tup_pp
        )?;
        writeln!(f, "  pF     {}", self.pf)?;
        write!(f, "  sigs   {sig_name}")?;
        if self.sigtype == 's' as u32 {
            write!(f, "  bits/attr: {}", self.tk)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "  tsigs  size: {} bits ({} bytes)  max/page: {}",
            self.tm, self.tsig_size, self.tsig_pp
        )?;
        writeln!(
            f,
            "  psigs  size: {} bits ({} bytes)  max/page: {}",
            self.pm, self.psig_size, self.psig_pp
        )?;
        write!(
            f,
            "  bsigs  size: {} bits ({} bytes)  max/page: {}",
            self.bm, self.bsig_size, self.bsig_pp
        )
    }
}

fn round_up_to_byte(nbits: u32) -> u32 {
    if nbits % 8 > 0 {
        nbits + (8 - nbits % 8)
    } else {
        nbits
    }
}

/// An open relation: its five backing files plus the parameters that
/// describe how they're laid out.
pub struct Relation {
    name: String,
    params: RelnParams,
    data: PagedFile,
    tsig: PagedFile,
    psig: PagedFile,
    bsig: PagedFile,
}

impl Relation {
    fn path(name: &str, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{name}.{suffix}"))
    }

    /// Creates the five files backing a new relation and writes its
    /// info file. `tupsize` is the fixed width, in bytes, of one packed
    /// tuple record. `pf` is the target data-pages-per-page-signature
    /// ratio the caller sized the relation for; it's recorded on
    /// `RelnParams` for informational display but never consulted by
    /// `create`/`insert`/`Query`. `tm`/`pm`/`bm` are signature lengths in
    /// bits for tuple, page, and bit-slice signatures respectively, each
    /// rounded up to a whole number of bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        name: &str,
        nattrs: u32,
        pf: f32,
        tupsize: u32,
        sig_type: SigType,
        tk: u32,
        tm: u32,
        pm: u32,
        bm: u32,
    ) -> Result<Self, RelationError> {
        if Self::path(name, "info").exists() {
            return Err(RelationError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let tm = round_up_to_byte(tm);
        let pm = round_up_to_byte(pm);
        let bm = round_up_to_byte(bm);

        let available = (PAGESIZE - 4) as u32;
        let tup_pp = available / tupsize;
        let tsig_size = tm / 8;
        let tsig_pp = available / tsig_size;
        let psig_size = pm / 8;
        let psig_pp = available / psig_size;
        if psig_pp < 2 {
            log::error!("relation {name:?}: psig length {pm} bits gives only {psig_pp} signatures per page, need at least 2");
            return Err(RelationError::TooFewPsigSlots);
        }
        let bsig_size = bm / 8;
        let bsig_pp = available / bsig_size;
        if bsig_pp < 2 {
            log::error!("relation {name:?}: bsig length {bm} bits gives only {bsig_pp} slices per page, need at least 2");
            return Err(RelationError::TooFewBsigSlots);
        }

        let mut data = PagedFile::open(Self::path(name, "data"))?;
        let mut tsig = PagedFile::open(Self::path(name, "tsig"))?;
        let mut psig = PagedFile::open(Self::path(name, "psig"))?;
        let mut bsig = PagedFile::open(Self::path(name, "bsig"))?;

        data.add_page()?;
        tsig.add_page()?;
        psig.add_page()?;

        // Seed `pm` all-zero bit-slice rows, each `bm` bits wide: one row
        // per possible psig bit position, so the insert path can always
        // OR a data page's bit into an existing row.
        let zero_row = BitString::new(bm as usize);
        let mut bsig_pid = bsig.add_page()?;
        let mut bsig_page = bsig.get_page(bsig_pid)?;
        let mut nbsigs = 0u32;
        for _ in 0..pm {
            if bsig_page.item_count() == bsig_pp {
                bsig.put_page(bsig_pid, &bsig_page)?;
                bsig_pid = bsig.add_page()?;
                bsig_page = bsig.get_page(bsig_pid)?;
            }
            bsig_page.put_item(bsig_page.item_count(), bsig_size as usize, zero_row.as_bytes())?;
            bsig_page.add_one_item();
            nbsigs += 1;
        }
        bsig.put_page(bsig_pid, &bsig_page)?;

        let params = RelnParams {
            nattrs,
            pf,
            sigtype: sig_type.tag() as u32,
            tupsize,
            tup_pp,
            tk,
            tm,
            tsig_size,
            tsig_pp,
            pm,
            psig_size,
            psig_pp,
            bm,
            bsig_size,
            bsig_pp,
            npages: 1,
            ntups: 0,
            tsig_npages: 1,
            ntsigs: 0,
            psig_npages: 1,
            npsigs: 0,
            bsig_npages: bsig.npages(),
            nbsigs,
        };

        let relation = Self {
            name: name.to_string(),
            params,
            data,
            tsig,
            psig,
            bsig,
        };
        relation.persist()?;
        log::debug!(
            "relation {name:?}: created ({tup_pp} tups/page, {tsig_pp} tsigs/page, {psig_pp} psigs/page, {bsig_pp} bsigs/page)"
        );
        Ok(relation)
    }

    /// Opens an existing relation, reading its parameters back from the
    /// info file.
    pub fn open(name: &str) -> Result<Self, RelationError> {
        let info_path = Self::path(name, "info");
        let mut info = File::open(&info_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelationError::NotFound {
                    name: name.to_string(),
                }
            } else {
                RelationError::Io(e)
            }
        })?;
        let mut buf = vec![0u8; size_of::<RelnParams>()];
        info.read_exact(&mut buf)?;
        let params = RelnParams::read_from_bytes(&buf).map_err(|_| RelationError::CorruptInfo)?;

        let data = PagedFile::open(Self::path(name, "data"))?;
        let tsig = PagedFile::open(Self::path(name, "tsig"))?;
        let psig = PagedFile::open(Self::path(name, "psig"))?;
        let bsig = PagedFile::open(Self::path(name, "bsig"))?;

        Ok(Self {
            name: name.to_string(),
            params,
            data,
            tsig,
            psig,
            bsig,
        })
    }

    /// Writes the current parameters back to the info file. Called
    /// after every mutation so a crash never loses more than the
    /// in-flight insert.
    pub fn persist(&self) -> Result<(), RelationError> {
        let mut info = File::create(Self::path(&self.name, "info"))?;
        info.write_all(self.params.as_bytes())?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &RelnParams {
        &self.params
    }

    pub fn sig_type(&self) -> SigType {
        let tag = char::from_u32(self.params.sigtype).unwrap_or('s');
        SigType::from_tag(tag).unwrap_or(SigType::Simc)
    }

    /// Builds a signature using whatever scheme tag is actually stored
    /// in `RelnParams`, rather than the restricted [`SigType`] this
    /// crate's own `create` accepts — see [`sig_for_tag`] for why that
    /// distinction is kept alive at this layer.
    fn make_sig(&self, tuple: &Tuple, siglen: usize, ntup: usize) -> BitString {
        let tag = char::from_u32(self.params.sigtype).unwrap_or('s');
        sig_for_tag(tag, tuple.attrs(), siglen, ntup, self.params.tk as usize)
    }

    /// The signature a single tuple contributes to the tuple-signature
    /// file.
    pub fn tuple_sig(&self, tuple: &Tuple) -> BitString {
        self.make_sig(tuple, self.params.tm as usize, 1)
    }

    /// The signature a single tuple contributes when OR'd into its data
    /// page's page signature.
    pub fn page_sig(&self, tuple: &Tuple) -> BitString {
        self.make_sig(tuple, self.params.pm as usize, self.params.tup_pp as usize)
    }

    pub fn npages(&self) -> u32 {
        self.params.npages
    }

    pub fn get_data_page(&mut self, id: PageId) -> Result<Page, RelationError> {
        Ok(self.data.get_page(id)?)
    }

    pub fn get_tsig_page(&mut self, id: PageId) -> Result<Page, RelationError> {
        Ok(self.tsig.get_page(id)?)
    }

    pub fn get_psig_page(&mut self, id: PageId) -> Result<Page, RelationError> {
        Ok(self.psig.get_page(id)?)
    }

    pub fn get_bsig_page(&mut self, id: PageId) -> Result<Page, RelationError> {
        Ok(self.bsig.get_page(id)?)
    }

    /// Unpacks tuple `slot` out of a data `page`.
    pub fn tuple_from_page(&self, page: &Page, slot: u32) -> Result<Tuple, RelationError> {
        let record = page.get_item(slot, self.params.tupsize as usize)?;
        Ok(Tuple::unpack(
            record,
            self.params.tupsize as usize,
            self.params.nattrs as usize,
        )?)
    }

    /// Appends `tuple` to the relation: the data page, its tuple
    /// signature, its contribution to the owning data page's page
    /// signature, and the affected bit-slice rows.
    pub fn insert(&mut self, tuple: &Tuple) -> Result<PageId, RelationError> {
        if tuple.nattrs() != self.params.nattrs as usize {
            return Err(RelationError::WrongAttrCount {
                expected: self.params.nattrs as usize,
                actual: tuple.nattrs(),
            });
        }
        let record = tuple.pack(self.params.tupsize as usize);

        let mut datapid = self.params.npages - 1;
        let mut datapage = self.data.get_page(datapid)?;
        if datapage.item_count() == self.params.tup_pp {
            datapid = self.data.add_page()?;
            datapage = self.data.get_page(datapid)?;
            self.params.npages += 1;
            log::trace!("relation {:?}: allocated data page {datapid}", self.name);
        }
        datapage.put_item(datapage.item_count(), self.params.tupsize as usize, &record)?;
        datapage.add_one_item();
        self.params.ntups += 1;
        self.data.put_page(datapid, &datapage)?;

        let tsig = self.tuple_sig(tuple);
        let mut tsigpid = self.params.tsig_npages - 1;
        let mut tsigpage = self.tsig.get_page(tsigpid)?;
        if tsigpage.item_count() == self.params.tsig_pp {
            tsigpid = self.tsig.add_page()?;
            tsigpage = self.tsig.get_page(tsigpid)?;
            self.params.tsig_npages += 1;
            log::trace!("relation {:?}: allocated tsig page {tsigpid}", self.name);
        }
        tsigpage.put_item(tsigpage.item_count(), self.params.tsig_size as usize, tsig.as_bytes())?;
        tsigpage.add_one_item();
        self.params.ntsigs += 1;
        self.tsig.put_page(tsigpid, &tsigpage)?;
        log::trace!("relation {:?}: wrote tsig for data page {datapid}", self.name);

        let tuppsig = self.page_sig(tuple);
        let psig_bits = self.params.pm as usize;
        let psig_size = self.params.psig_size as usize;
        let psigpid = datapid / self.params.psig_pp;
        let mut psigpage = if psigpid > self.params.psig_npages - 1 {
            let id = self.psig.add_page()?;
            self.params.psig_npages += 1;
            log::trace!("relation {:?}: allocated psig page {id}", self.name);
            self.psig.get_page(id)?
        } else {
            self.psig.get_page(psigpid)?
        };
        let slot = datapid % self.params.psig_pp;
        let mut curpsig = BitString::from_bytes(psig_bits, psigpage.get_item(slot, psig_size)?)?;
        curpsig.or(&tuppsig);
        psigpage.put_item(slot, psig_size, curpsig.as_bytes())?;
        if self.params.npsigs < self.params.npages {
            self.params.npsigs += 1;
            psigpage.add_one_item();
        }
        self.psig.put_page(psigpid, &psigpage)?;
        log::trace!("relation {:?}: OR'd tuple contribution into psig of data page {datapid}", self.name);

        let bsig_bits = self.params.bm as usize;
        let bsig_size = self.params.bsig_size as usize;
        let mut cur_bsig_pid: Option<PageId> = None;
        let mut bsigpage: Option<Page> = None;
        for i in 0..psig_bits {
            if !tuppsig.get(i) {
                continue;
            }
            let pid = i as u32 / self.params.bsig_pp;
            if cur_bsig_pid != Some(pid) {
                if let (Some(prev_pid), Some(page)) = (cur_bsig_pid, bsigpage.as_ref()) {
                    self.bsig.put_page(prev_pid, page)?;
                }
                cur_bsig_pid = Some(pid);
                bsigpage = Some(self.bsig.get_page(pid)?);
                log::trace!("relation {:?}: loaded bsig page {pid}", self.name);
            }
            let page = bsigpage.as_mut().expect("just populated above");
            let row = i as u32 % self.params.bsig_pp;
            let mut bits = BitString::from_bytes(bsig_bits, page.get_item(row, bsig_size)?)?;
            bits.set(datapid as usize);
            page.put_item(row, bsig_size, bits.as_bytes())?;
        }
        if let (Some(pid), Some(page)) = (cur_bsig_pid, bsigpage) {
            self.bsig.put_page(pid, &page)?;
        }

        self.persist()?;
        log::debug!(
            "relation {:?}: inserted tuple into data page {datapid} (ntups={})",
            self.name,
            self.params.ntups
        );
        Ok(datapid)
    }
}

impl Drop for Relation {
    fn drop(&mut self) {
        if let Err(e) = self.persist() {
            log::error!("failed to persist relation {:?} on close: {e}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_temp_dir<T>(f: impl FnOnce() -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = f();
        std::env::set_current_dir(prev).unwrap();
        result
    }

    #[test]
    fn create_then_open_roundtrips_params() {
        in_temp_dir(|| {
            {
                let r = Relation::create("people", 2, 1.0, 16, SigType::Simc, 4, 32, 64, 32).unwrap();
                assert_eq!(r.params().nattrs, 2);
                assert_eq!(r.params().npages, 1);
            }
            let r = Relation::open("people").unwrap();
            assert_eq!(r.params().nattrs, 2);
            assert_eq!(r.sig_type(), SigType::Simc);
        });
    }

    #[test]
    fn create_twice_fails() {
        in_temp_dir(|| {
            Relation::create("dup", 2, 1.0, 16, SigType::Simc, 4, 32, 64, 32).unwrap();
            assert!(Relation::create("dup", 2, 1.0, 16, SigType::Simc, 4, 32, 64, 32).is_err());
        });
    }

    #[test]
    fn open_missing_relation_fails() {
        in_temp_dir(|| {
            assert!(matches!(
                Relation::open("nope"),
                Err(RelationError::NotFound { .. })
            ));
        });
    }

    #[test]
    fn insert_updates_counters_and_roundtrips_tuple() {
        in_temp_dir(|| {
            let mut r = Relation::create("facts", 2, 1.0, 16, SigType::Simc, 4, 32, 64, 32).unwrap();
            let t = Tuple::parse("hello,42", 2).unwrap();
            let pid = r.insert(&t).unwrap();
            assert_eq!(pid, 0);
            assert_eq!(r.params().ntups, 1);
            assert_eq!(r.params().ntsigs, 1);

            let page = r.get_data_page(pid).unwrap();
            let restored = r.tuple_from_page(&page, 0).unwrap();
            assert_eq!(restored, t);
        });
    }

    #[test]
    fn inserting_past_page_capacity_allocates_a_new_page() {
        in_temp_dir(|| {
            let mut r = Relation::create("many", 1, 1.0, 4, SigType::Simc, 2, 16, 16, 16).unwrap();
            let tup_pp = r.params().tup_pp;
            for i in 0..=tup_pp {
                let t = Tuple::parse(&format!("{i}"), 1).unwrap();
                r.insert(&t).unwrap();
            }
            assert_eq!(r.params().npages, 2);
        });
    }

    #[test]
    fn too_few_psig_slots_is_rejected() {
        in_temp_dir(|| {
            let err = Relation::create("tiny", 2, 1.0, 16, SigType::Simc, 4, 32, 8192 * 8, 32);
            assert!(matches!(err, Err(RelationError::TooFewPsigSlots)));
        });
    }
}
