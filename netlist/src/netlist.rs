use indexmap::IndexMap;

use crate::{Const, SourceMemory, Value};

/// A parameter value on an emitted RAM cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Const(Const),
    Int(i64),
    Bool(bool),
    String(String),
}

impl From<Const> for ParamValue {
    fn from(value: Const) -> Self {
        ParamValue::Const(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.into())
    }
}

/// One instance of a target RAM cell, fully parameterized and wired.
#[derive(Debug, Clone)]
pub struct RamCell {
    pub name: String,
    pub kind: String,
    pub params: IndexMap<String, ParamValue>,
    pub ports: IndexMap<String, Value>,
}

impl RamCell {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { name: name.into(), kind: kind.into(), params: IndexMap::new(), ports: IndexMap::new() }
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn set_port(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.ports.insert(name.into(), value.into());
    }

    pub fn get_param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn get_port(&self, name: &str) -> Option<&Value> {
        self.ports.get(name)
    }
}

/// The netlist infrastructure the mapping engine runs against.
///
/// The engine only ever manipulates memories through this trait, so it can be exercised
/// against [`crate::Design`] in tests just as well as against a real synthesis netlist.
///
/// The emulation primitives rewrite the given memory so that a less capable hardware
/// port can implement it: each one peels a feature off the memory (adding compensating
/// soft logic to the design) and updates the port description accordingly.  The engine
/// relies on the updated description: after [`Netlist::emulate_read_enable`] the
/// port's enable must read as constant one.
pub trait Netlist {
    /// Canonicalizes the bits of `value` so that connected signals compare equal.
    fn sigmap(&self, value: &Value) -> Value;

    /// Like [`Netlist::sigmap`], but additionally looks through two-input muxes with
    /// one all-undef input.
    fn sigmap_xmux(&self, value: &Value) -> Value;

    /// Whether asserting any bit of write port `wpidx`'s enable provably implies read
    /// port `rpidx`'s enable.  `false` is always a sound answer.
    fn write_implies_read(&mut self, mem: &SourceMemory, wpidx: usize, rpidx: usize) -> bool;

    /// Whether write port `wpidx`'s enable and read port `rpidx`'s enable provably
    /// cannot be asserted together.  `false` is always a sound answer.
    fn write_excludes_read(&mut self, mem: &SourceMemory, wpidx: usize, rpidx: usize) -> bool;

    /// Delays every write port by half a cycle, making all read-write collisions
    /// return old data.
    fn emulate_read_first(&mut self, mem: &mut SourceMemory);

    /// Converts sync read port `pidx` to an async port by extracting its data register
    /// (including enable, resets, initial value, and transparency).
    fn extract_read_dff(&mut self, mem: &mut SourceMemory, pidx: usize);

    /// Emulates the read enable of port `pidx` with a soft output register; absorbs
    /// init and reset values.
    fn emulate_read_enable(&mut self, mem: &mut SourceMemory, pidx: usize);

    /// Rewrites port `pidx` so that a sync-reset-over-enable target implements its
    /// enable-over-sync-reset semantics.
    fn emulate_read_ce_over_srst(&mut self, mem: &mut SourceMemory, pidx: usize);

    /// The inverse of [`Netlist::emulate_read_ce_over_srst`].
    fn emulate_read_srst_over_ce(&mut self, mem: &mut SourceMemory, pidx: usize);

    /// Emulates the selected subset of {initial value, async reset, sync reset} of
    /// read port `pidx` in soft logic.
    fn emulate_reset(&mut self, mem: &mut SourceMemory, pidx: usize, init: bool, arst: bool, srst: bool);

    /// Emulates the priority of write port `later` over write port `earlier` by
    /// masking the earlier port's enables.
    fn emulate_priority(&mut self, mem: &mut SourceMemory, earlier: usize, later: usize);

    /// Emulates transparency of read port `rpidx` with respect to write port `wpidx`
    /// with a soft bypass.
    fn emulate_transparency(&mut self, mem: &mut SourceMemory, wpidx: usize, rpidx: usize);

    /// Decodes write port `wpidx`'s enables across the address space: returns one
    /// enable vector (of the port's enable width) per mux index.  Mux indices count
    /// the `addr_mux_bits` selector bits (low to high) and then the address range at
    /// and above `addr_shift` spanned by the memory.
    fn generate_demux(&mut self, mem: &SourceMemory, wpidx: usize, addr_shift: usize, addr_mux_bits: &[usize])
        -> Vec<Value>;

    /// The read-side counterpart of [`Netlist::generate_demux`]: returns one data
    /// vector (of the port's data width) per mux index; the caller drives them and the
    /// netlist muxes them onto read port `rpidx`'s output.
    fn generate_mux(&mut self, mem: &SourceMemory, rpidx: usize, addr_shift: usize, addr_mux_bits: &[usize])
        -> Vec<Value>;

    /// Creates a fresh wire of the given width.
    fn add_wire(&mut self, width: usize) -> Value;

    /// Emits an inverter and returns its output.
    fn add_not(&mut self, value: &Value) -> Value;

    /// Connects `lhs` to be driven by `rhs`.
    fn connect(&mut self, lhs: &Value, rhs: &Value);

    /// Emits one target RAM cell.
    fn add_ram_cell(&mut self, cell: RamCell);

    /// Removes the (now fully replaced) memory from the design.
    fn remove_memory(&mut self, mem: SourceMemory);
}
