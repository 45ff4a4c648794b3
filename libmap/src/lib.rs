//! Maps abstract memories onto the RAM cells of a target library.
//!
//! The engine works on one memory at a time, roughly as follows:
//!
//! - a textual library description is parsed into a typed capability model
//!   ([`Library`]), with `ifdef` conditions resolved and `option`/`portoption` scopes
//!   captured per capability;
//! - a list of candidate mappings is assembled, one per RAM definition compatible
//!   with the user-requested kind or style;
//! - the candidate list is run through a pipeline of filter-and-split stages: source
//!   write ports and read ports are assigned to hardware port groups (possibly
//!   sharing a read/write port pair), transparency and priority requirements are
//!   matched against hardware capabilities, and read enable/reset/init values are
//!   either bound to hardware features or marked for soft emulation;
//! - every surviving candidate gets an emulation score and a geometry: base data
//!   width, byte granularity, hard-wide address bits, data/port replication counts,
//!   and a padding swizzle, chosen to minimize a cost heuristic;
//! - the cheapest candidate is emitted as an array of RAM cells with emulation logic
//!   patched around it, unless falling back to plain registers is both allowed and
//!   cheaper, in which case the memory is left alone for a later register-mapping
//!   pass.
//!
//! The engine has no netlist of its own: signals, SAT queries, and the memory
//! rewriting primitives are reached through the `Netlist` trait of
//! [`ramforge_netlist`].

use std::error::Error;
use std::fmt::Display;

use log::info;

use ramforge_netlist::{Netlist, SourceMemory};

pub mod library;
pub mod parse;

mod emit;
mod geometry;
mod mapping;

pub use library::{LibOptions, Library, RamKind};
pub use mapping::{MemConfig, MemMapping, RdPortConfig, WrPortConfig};
pub use parse::{parse_library, ParseError};

/// A fatal mapping failure.  There are no partial results: a memory either maps
/// cleanly or the whole pass gives up.
#[derive(Debug, Clone)]
pub enum MapError {
    /// No RAMs of the requested kind exist in the library.
    NoRams { memory: String, kind: RamKind },
    /// No RAMs declare the requested style string.
    NoStyle { memory: String, style: String },
    /// Candidates exist but every one was pruned, and registers are not an option.
    NoMapping { memory: String },
}

impl Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::NoRams { memory, kind } => {
                let kind = match kind {
                    RamKind::Distributed => "distributed ",
                    RamKind::Block => "block ",
                    RamKind::Huge => "huge ",
                    _ => "",
                };
                write!(f, "{}: no available {}RAMs", memory, kind)
            }
            MapError::NoStyle { memory, style } => {
                write!(f, "{}: no available RAMs with style \"{}\"", memory, style)
            }
            MapError::NoMapping { memory } => write!(f, "no valid mapping found for memory {}", memory),
        }
    }
}

impl Error for MapError {}

/// Maps each memory independently onto `lib`, emitting cells into `netlist`.
///
/// Returns the memories that chose the register fallback; they are left untouched
/// for a later register-mapping pass.
pub fn lower_memories<N: Netlist>(
    netlist: &mut N,
    lib: &Library,
    memories: Vec<SourceMemory>,
) -> Result<Vec<SourceMemory>, MapError> {
    let mut leftover = vec![];
    for mut mem in memories {
        let mapping = MemMapping::new(netlist, &mut mem, lib)?;
        let mut choice = None;
        let mut best = mapping.logic_cost;
        if !mapping.logic_ok {
            if mapping.cfgs.is_empty() {
                return Err(MapError::NoMapping { memory: mem.id.clone() });
            }
            choice = Some(0);
            best = mapping.cfgs[0].cost;
        }
        for (index, cfg) in mapping.cfgs.iter().enumerate() {
            if cfg.cost < best {
                choice = Some(index);
                best = cfg.cost;
            }
        }
        match choice {
            None => {
                drop(mapping);
                info!("using register mapping for memory {}", mem.id);
                leftover.push(mem);
            }
            Some(index) => {
                let mut mapping = mapping;
                let cfg = mapping.cfgs[index].clone();
                mapping.emit(&cfg);
                drop(mapping);
                netlist.remove_memory(mem);
            }
        }
    }
    Ok(leftover)
}
