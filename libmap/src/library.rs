//! The typed model of a RAM library: every RAM definition with its dimension, byte,
//! init, style, and port group capabilities, each qualified by the option bindings it
//! was declared under.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use log::warn;

/// A mapping-relevant RAM category, or a user-requested mapping style.
///
/// Libraries only define `Distributed`, `Block`, and `Huge` RAMs; the remaining
/// variants occur as user requests on a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RamKind {
    #[default]
    Auto,
    Logic,
    NotLogic,
    Distributed,
    Block,
    Huge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryInitKind {
    None,
    Zero,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortKind {
    #[default]
    Ar,
    Sr,
    Sw,
    Arsw,
    Srsw,
}

impl PortKind {
    pub fn is_write(self) -> bool {
        matches!(self, PortKind::Sw | PortKind::Arsw | PortKind::Srsw)
    }

    pub fn is_read(self) -> bool {
        !matches!(self, PortKind::Sw)
    }

    pub fn is_sync_read(self) -> bool {
        matches!(self, PortKind::Sr | PortKind::Srsw)
    }

    pub fn is_async_read(self) -> bool {
        matches!(self, PortKind::Ar | PortKind::Arsw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClkPolKind {
    #[default]
    Anyedge,
    Posedge,
    Negedge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdEnKind {
    None,
    Any,
    WriteImplies,
    WriteExcludes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Init,
    Async,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetValKind {
    None,
    Zero,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrstKind {
    SrstOverEn,
    EnOverSrst,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransTarget {
    SelfPort,
    OtherPort,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransKind {
    New,
    Old,
}

/// The value of a library option binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptValue {
    Int(i64),
    String(String),
}

/// Option bindings, in declaration order.
pub type Options = IndexMap<String, OptValue>;

/// True if the two option maps bind the same name to different values.
pub fn opts_conflict(a: &Options, b: &Options) -> bool {
    a.iter().any(|(name, value)| b.get(name).is_some_and(|other| other != value))
}

/// True if `dst` already contains every binding of `src`.
pub fn opts_applied(dst: &Options, src: &Options) -> bool {
    src.iter().all(|(name, value)| dst.get(name) == Some(value))
}

/// Merges the bindings of `src` into `dst`.  Returns false (leaving `dst` partially
/// updated) if a binding conflicts.
pub fn apply_opts(dst: &mut Options, src: &Options) -> bool {
    for (name, value) in src {
        match dst.get(name) {
            None => {
                dst.insert(name.clone(), value.clone());
            }
            Some(bound) if bound != value => return false,
            Some(_) => (),
        }
    }
    true
}

/// A capability, valid only under the captured RAM-scoped and port-scoped option
/// bindings.
#[derive(Debug, Clone)]
pub struct Capability<T> {
    pub val: T,
    pub opts: Options,
    pub portopts: Options,
}

pub type Caps<T> = Vec<Capability<T>>;

#[derive(Debug, Clone, Default)]
pub struct ClockDef {
    pub kind: ClkPolKind,
    /// Named clocks of one RAM resolve to a single shared signal.
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResetValDef {
    pub kind: ResetKind,
    pub val_kind: ResetValKind,
}

#[derive(Debug, Clone)]
pub struct WrTransDef {
    pub target: TransTarget,
    pub kind: TransKind,
}

/// Allowed port widths.  Empty width lists mean the port follows the dims `dbits`
/// progression directly.
#[derive(Debug, Clone, Default)]
pub struct WidthDef {
    pub tied: bool,
    pub wr_widths: Vec<usize>,
    pub rd_widths: Vec<usize>,
}

/// One group of identically-capable hardware ports.  The arity of the group is the
/// number of port names.
#[derive(Debug, Clone, Default)]
pub struct PortGroupDef {
    pub kind: PortKind,
    pub names: Vec<String>,
    pub clock: Caps<ClockDef>,
    pub width: Caps<WidthDef>,
    pub addrce: Caps<()>,
    pub rden: Caps<RdEnKind>,
    pub rdrstval: Caps<ResetValDef>,
    pub rdsrstmode: Caps<SrstKind>,
    pub wrprio: Caps<String>,
    pub wrtrans: Caps<WrTransDef>,
    pub wrcs: Caps<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDimsDef {
    pub abits: usize,
    /// Usable data widths, strictly more than doubling at each step.
    pub dbits: Vec<usize>,
    /// All ports share one width (no per-port width selection).
    pub tied: bool,
    pub resource_name: Option<String>,
    pub resource_count: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RamDef {
    pub id: String,
    pub kind: RamKind,
    pub prune_rom: bool,
    pub ports: Caps<PortGroupDef>,
    pub dims: Caps<MemoryDimsDef>,
    pub byte: Caps<usize>,
    pub init: Caps<MemoryInitKind>,
    pub style: Caps<String>,
}

/// Library-wide behavior switches, fed from the host's command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibOptions {
    pub no_auto_distributed: bool,
    pub no_auto_block: bool,
    pub no_auto_huge: bool,
    pub debug_geom: bool,
}

/// A parsed RAM library.  Immutable once parsing is finished.
#[derive(Debug)]
pub struct Library {
    pub ram_defs: Vec<RamDef>,
    pub opts: LibOptions,
    pub defines: BTreeSet<String>,
    pub defines_unused: BTreeSet<String>,
}

impl Library {
    pub fn new(opts: LibOptions, defines: BTreeSet<String>) -> Self {
        Self { ram_defs: vec![], opts, defines_unused: defines.clone(), defines }
    }

    /// Reports defines that no library file ever tested.  Call after all files are
    /// parsed.
    pub fn finish(&self) {
        for define in &self.defines_unused {
            warn!("define {} not used in the library.", define);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{apply_opts, opts_applied, opts_conflict, OptValue, Options};

    fn opts(bindings: &[(&str, i64)]) -> Options {
        bindings.iter().map(|&(name, value)| (name.to_owned(), OptValue::Int(value))).collect()
    }

    #[test]
    fn test_conflict() {
        assert!(!opts_conflict(&opts(&[("A", 1)]), &opts(&[("B", 2)])));
        assert!(!opts_conflict(&opts(&[("A", 1)]), &opts(&[("A", 1), ("B", 2)])));
        assert!(opts_conflict(&opts(&[("A", 1)]), &opts(&[("A", 2)])));
    }

    #[test]
    fn test_apply() {
        let mut dst = opts(&[("A", 1)]);
        assert!(apply_opts(&mut dst, &opts(&[("B", 2)])));
        assert!(opts_applied(&dst, &opts(&[("A", 1), ("B", 2)])));
        assert!(!opts_applied(&dst, &opts(&[("C", 3)])));
        assert!(!apply_opts(&mut dst, &opts(&[("A", 2)])));
    }
}
