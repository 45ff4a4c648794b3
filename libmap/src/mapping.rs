//! Candidate enumeration: builds up the set of feasible [`MemConfig`]s for one memory
//! by running a sequence of filter-and-split stages over a working list of partial
//! configurations.  Each stage may multiply a candidate (one successor per applicable
//! capability), annotate it with required emulations, or kill it.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::debug;

use ramforge_netlist::{Const, Net, Netlist, SourceMemory, Trit};

use crate::library::{
    apply_opts, opts_applied, Capability, ClkPolKind, ClockDef, Library, MemoryInitKind, Options, PortKind, RamKind,
    RdEnKind, ResetKind, ResetValDef, ResetValKind, SrstKind, TransKind, TransTarget,
};
use crate::MapError;

/// Assignment of one source write port to a hardware port group.
#[derive(Debug, Clone)]
pub struct WrPortConfig {
    /// The read port sharing this hardware port, if any.
    pub rd_port: Option<usize>,
    /// Index of the port group in the RAM definition.
    pub port_def: usize,
    pub portopts: Options,
    /// Emulate priority over these (source) write ports.
    pub emu_prio: Vec<usize>,
    pub clkpol_kind: ClkPolKind,
    pub width_def: usize,
}

impl WrPortConfig {
    fn new(port_def: usize) -> Self {
        Self {
            rd_port: None,
            port_def,
            portopts: Options::new(),
            emu_prio: vec![],
            clkpol_kind: ClkPolKind::Anyedge,
            width_def: 0,
        }
    }
}

/// Assignment of one source read port to a hardware port group.
#[derive(Debug, Clone)]
pub struct RdPortConfig {
    /// The write port this read port shares hardware with, if any.  When set, the
    /// write port's `portopts` are authoritative and `portopts` here is unused.
    pub wr_port: Option<usize>,
    pub port_def: usize,
    pub portopts: Options,
    /// First-write-wins bindings for named reset values.
    pub resetvals: IndexMap<String, Const>,
    /// Sync read mapped onto async hardware: an output register is extracted.
    pub emu_sync: bool,
    pub emu_en: bool,
    pub emu_arst: bool,
    pub emu_srst: bool,
    pub emu_init: bool,
    pub emu_srst_en_prio: bool,
    /// The hardware read enable input is present and should be driven.
    pub emit_en: bool,
    /// Emulate transparency with these (source) write ports.
    pub emu_trans: Vec<usize>,
    pub clkpol_kind: ClkPolKind,
    pub width_def: usize,
}

impl RdPortConfig {
    fn new(port_def: usize) -> Self {
        Self {
            wr_port: None,
            port_def,
            portopts: Options::new(),
            resetvals: IndexMap::new(),
            emu_sync: false,
            emu_en: false,
            emu_arst: false,
            emu_srst: false,
            emu_init: false,
            emu_srst_en_prio: false,
            emit_en: false,
            emu_trans: vec![],
            clkpol_kind: ClkPolKind::Anyedge,
            width_def: 0,
        }
    }
}

/// A (partial) candidate mapping of one memory onto one RAM definition.
#[derive(Debug, Clone)]
pub struct MemConfig {
    /// Index of the RAM definition in the library.
    pub ram_def: usize,
    pub opts: Options,
    pub wr_ports: Vec<WrPortConfig>,
    pub rd_ports: Vec<RdPortConfig>,
    /// Named clock assignments.  For anyedge clocks the flag is the shared polarity;
    /// for directed clocks it is the "needs inversion" flag.
    pub clocks_anyedge: IndexMap<String, (Net, bool)>,
    pub clocks_pnedge: IndexMap<String, (Net, bool)>,
    /// Emulate read-first collision semantics by delaying all writes half a cycle.
    pub emu_read_first: bool,
    pub dims_def: usize,
    /// Chosen write-enable granularity; 0 means full-word.
    pub byte: usize,
    pub base_width_log2: usize,
    pub unit_width_log2: usize,
    /// Source word layout in the padded hardware word; `None` is a padding slot.
    pub swizzle: Vec<Option<usize>>,
    pub hard_wide_mask: u32,
    pub emu_wide_mask: u32,
    /// Array replicas needed to cover the data width.
    pub repl_d: usize,
    /// Array replicas needed to provide enough read ports.
    pub repl_port: usize,
    pub score_emu: usize,
    pub score_mux: usize,
    pub score_demux: usize,
    pub cost: f64,
}

impl MemConfig {
    fn new(ram_def: usize) -> Self {
        Self {
            ram_def,
            opts: Options::new(),
            wr_ports: vec![],
            rd_ports: vec![],
            clocks_anyedge: IndexMap::new(),
            clocks_pnedge: IndexMap::new(),
            emu_read_first: false,
            dims_def: 0,
            byte: 0,
            base_width_log2: 0,
            unit_width_log2: 0,
            swizzle: vec![],
            hard_wide_mask: 0,
            emu_wide_mask: 0,
            repl_d: 1,
            repl_port: 1,
            score_emu: 0,
            score_mux: 0,
            score_demux: 0,
            cost: 0.0,
        }
    }
}

pub(crate) fn apply_wrport_opts<T>(cfg: &mut MemConfig, pidx: usize, cap: &Capability<T>) -> bool {
    apply_opts(&mut cfg.opts, &cap.opts) && apply_opts(&mut cfg.wr_ports[pidx].portopts, &cap.portopts)
}

pub(crate) fn apply_rdport_opts<T>(cfg: &mut MemConfig, pidx: usize, cap: &Capability<T>) -> bool {
    if let Some(wpidx) = cfg.rd_ports[pidx].wr_port {
        return apply_wrport_opts(cfg, wpidx, cap);
    }
    apply_opts(&mut cfg.opts, &cap.opts) && apply_opts(&mut cfg.rd_ports[pidx].portopts, &cap.portopts)
}

pub(crate) fn wrport_opts_applied<T>(cfg: &MemConfig, pidx: usize, cap: &Capability<T>) -> bool {
    opts_applied(&cfg.opts, &cap.opts) && opts_applied(&cfg.wr_ports[pidx].portopts, &cap.portopts)
}

pub(crate) fn rdport_opts_applied<T>(cfg: &MemConfig, pidx: usize, cap: &Capability<T>) -> bool {
    if let Some(wpidx) = cfg.rd_ports[pidx].wr_port {
        return wrport_opts_applied(cfg, wpidx, cap);
    }
    opts_applied(&cfg.opts, &cap.opts) && opts_applied(&cfg.rd_ports[pidx].portopts, &cap.portopts)
}

/// Binds a (possibly named) clock capability to a source clock.  The first binding of
/// a name decides; later bindings must agree exactly.
fn apply_clock(cfg: &mut MemConfig, def: &ClockDef, clk: Net, clk_polarity: bool) -> bool {
    let Some(name) = &def.name else { return true };
    if def.kind == ClkPolKind::Anyedge {
        match cfg.clocks_anyedge.get(name) {
            None => {
                cfg.clocks_anyedge.insert(name.clone(), (clk, clk_polarity));
                true
            }
            Some(&bound) => bound == (clk, clk_polarity),
        }
    } else {
        let flip = clk_polarity ^ (def.kind == ClkPolKind::Posedge);
        match cfg.clocks_pnedge.get(name) {
            None => {
                cfg.clocks_pnedge.insert(name.clone(), (clk, flip));
                true
            }
            Some(&bound) => bound == (clk, flip),
        }
    }
}

/// Checks whether a reset-value capability admits the given value, binding named
/// values first-write-wins.
fn apply_rstval(pcfg: &mut RdPortConfig, def: &ResetValDef, val: &Const) -> bool {
    match &def.val_kind {
        ResetValKind::None => false,
        ResetValKind::Zero => !val.iter().any(|trit| trit == Trit::One),
        ResetValKind::Named(name) => match pcfg.resetvals.get(name) {
            None => {
                pcfg.resetvals.insert(name.clone(), val.clone());
                true
            }
            Some(bound) => bound == val,
        },
    }
}

fn same_geom(a: &MemConfig, b: &MemConfig) -> bool {
    if a.ram_def != b.ram_def || a.dims_def != b.dims_def || a.byte != b.byte {
        return false;
    }
    for (pa, pb) in a.wr_ports.iter().zip(&b.wr_ports) {
        if pa.rd_port != pb.rd_port || pa.port_def != pb.port_def || pa.width_def != pb.width_def {
            return false;
        }
    }
    for (pa, pb) in a.rd_ports.iter().zip(&b.rd_ports) {
        if pa.wr_port != pb.wr_port || pa.port_def != pb.port_def || pa.width_def != pb.width_def {
            return false;
        }
    }
    true
}

/// Per-memory mapping state: the working candidate list and the queries shared by the
/// enumeration stages.
pub struct MemMapping<'a, N: Netlist> {
    pub(crate) netlist: &'a mut N,
    pub(crate) mem: &'a mut SourceMemory,
    pub(crate) lib: &'a Library,
    pub cfgs: Vec<MemConfig>,
    pub logic_ok: bool,
    pub logic_cost: f64,
    pub(crate) kind: RamKind,
    pub(crate) style: Option<String>,
    wr_implies_rd_cache: BTreeMap<(usize, usize), bool>,
    wr_excludes_rd_cache: BTreeMap<(usize, usize), bool>,
}

impl<'a, N: Netlist> MemMapping<'a, N> {
    pub fn new(netlist: &'a mut N, mem: &'a mut SourceMemory, lib: &'a Library) -> Result<Self, MapError> {
        let mut this = Self {
            netlist,
            mem,
            lib,
            cfgs: vec![],
            logic_ok: false,
            logic_cost: 0.0,
            kind: RamKind::Auto,
            style: None,
            wr_implies_rd_cache: BTreeMap::new(),
            wr_excludes_rd_cache: BTreeMap::new(),
        };
        this.determine_style();
        this.logic_ok = this.determine_logic_ok();
        this.logic_cost = (this.mem.width * this.mem.size) as f64;
        if this.kind == RamKind::Logic {
            return Ok(this);
        }
        this.cfgs = (0..this.lib.ram_defs.len()).map(MemConfig::new).collect();
        this.handle_ram_kind()?;
        this.handle_ram_style()?;
        this.handle_init();
        this.handle_wr_ports();
        this.handle_rd_ports();
        this.handle_trans();
        // If we got this far, the memory is mappable.  The remaining stages may
        // require emulating some functionality, but cannot make the mapping fail.
        this.handle_priority();
        this.handle_rd_reset_values(ResetKind::Init);
        this.handle_rd_reset_values(ResetKind::Async);
        this.handle_rd_reset_values(ResetKind::Sync);
        this.score_emu_ports();
        this.dump_configs("after initial split");
        this.handle_geom_split();
        this.dump_configs("after geometry split");
        this.prune_pre_geom();
        this.dump_configs("after pre-geometry prune");
        this.handle_geom();
        this.dump_configs("post-geometry");
        this.prune_post_geom();
        this.dump_configs("after post-geometry prune");
        Ok(this)
    }

    /// Decodes the memory attributes into the user-requested mapping style.
    fn determine_style(&mut self) {
        self.kind = RamKind::Auto;
        self.style = None;
        for attr in
            ["ram_block", "rom_block", "ram_style", "rom_style", "ramstyle", "romstyle", "syn_ramstyle", "syn_romstyle"]
        {
            let Some(value) = self.mem.attributes.get(attr) else { continue };
            match value {
                ramforge_netlist::AttrValue::Int(_) => self.kind = RamKind::NotLogic,
                ramforge_netlist::AttrValue::String(value) => match value.as_str() {
                    "auto" => (),
                    "logic" | "registers" => self.kind = RamKind::Logic,
                    "distributed" => self.kind = RamKind::Distributed,
                    "block" | "block_ram" | "ebr" => self.kind = RamKind::Block,
                    "huge" | "ultra" => self.kind = RamKind::Huge,
                    other => {
                        self.kind = RamKind::NotLogic;
                        self.style = Some(other.to_owned());
                    }
                },
            }
            return;
        }
        if self.mem.get_bool_attribute("logic_block") {
            self.kind = RamKind::Logic;
        }
    }

    /// A memory can fall back to a pile of registers only if every write port shares
    /// one clock domain.
    fn determine_logic_ok(&self) -> bool {
        if self.kind != RamKind::Auto && self.kind != RamKind::Logic {
            return false;
        }
        let Some(first) = self.mem.write_ports.first() else { return true };
        self.mem
            .write_ports
            .iter()
            .all(|port| port.clk_enable && port.clk == first.clk && port.clk_polarity == first.clk_polarity)
    }

    fn handle_ram_kind(&mut self) -> Result<(), MapError> {
        if self.style.is_some() {
            return Ok(());
        }
        let (lib, kind) = (self.lib, self.kind);
        self.cfgs.retain(|cfg| {
            let rdef = &lib.ram_defs[cfg.ram_def];
            if rdef.kind == kind {
                return true;
            }
            if kind == RamKind::Auto || kind == RamKind::NotLogic {
                return match rdef.kind {
                    RamKind::Distributed => !lib.opts.no_auto_distributed,
                    RamKind::Block => !lib.opts.no_auto_block,
                    RamKind::Huge => !lib.opts.no_auto_huge,
                    _ => true,
                };
            }
            false
        });
        if self.cfgs.is_empty() {
            match self.kind {
                RamKind::Distributed | RamKind::Block | RamKind::Huge | RamKind::NotLogic => {
                    return Err(MapError::NoRams { memory: self.mem.id.clone(), kind: self.kind });
                }
                _ => (),
            }
        }
        Ok(())
    }

    fn handle_ram_style(&mut self) -> Result<(), MapError> {
        let Some(style) = self.style.clone() else { return Ok(()) };
        let lib = self.lib;
        let mut new_cfgs = vec![];
        for cfg in std::mem::take(&mut self.cfgs) {
            for def in &lib.ram_defs[cfg.ram_def].style {
                if def.val != style {
                    continue;
                }
                let mut new_cfg = cfg.clone();
                if !apply_opts(&mut new_cfg.opts, &def.opts) {
                    continue;
                }
                new_cfgs.push(new_cfg);
            }
        }
        self.cfgs = new_cfgs;
        if self.cfgs.is_empty() {
            return Err(MapError::NoStyle { memory: self.mem.id.clone(), style });
        }
        Ok(())
    }

    fn handle_init(&mut self) {
        let init = self.mem.get_init_data();
        let has_nonx = !init.is_undef();
        let has_one = init.iter().any(|trit| trit == Trit::One);
        if !has_nonx {
            return;
        }
        let lib = self.lib;
        let mut new_cfgs = vec![];
        for cfg in std::mem::take(&mut self.cfgs) {
            for def in &lib.ram_defs[cfg.ram_def].init {
                match def.val {
                    MemoryInitKind::Any => (),
                    MemoryInitKind::Zero if !has_one => (),
                    _ => continue,
                }
                let mut new_cfg = cfg.clone();
                if !apply_opts(&mut new_cfg.opts, &def.opts) {
                    continue;
                }
                new_cfgs.push(new_cfg);
            }
        }
        self.cfgs = new_cfgs;
    }

    /// Assigns every source write port to a port group and clock capability.
    fn handle_wr_ports(&mut self) {
        let lib = self.lib;
        if self.mem.write_ports.is_empty() {
            self.cfgs.retain(|cfg| !lib.ram_defs[cfg.ram_def].prune_rom);
        }
        for pidx in 0..self.mem.write_ports.len() {
            let port = &self.mem.write_ports[pidx];
            if !port.clk_enable {
                // Asynchronous write ports are not supported by any RAM.
                self.cfgs.clear();
                return;
            }
            let (clk, clk_polarity) = (port.clk, port.clk_polarity);
            let mut new_cfgs = vec![];
            for cfg in std::mem::take(&mut self.cfgs) {
                let ram_def = &lib.ram_defs[cfg.ram_def];
                for (didx, def) in ram_def.ports.iter().enumerate() {
                    if !def.val.kind.is_write() {
                        continue;
                    }
                    let used = cfg.wr_ports.iter().filter(|pcfg| pcfg.port_def == didx).count();
                    if used >= def.val.names.len() {
                        continue;
                    }
                    let mut cfg2 = cfg.clone();
                    if !apply_opts(&mut cfg2.opts, &def.opts) {
                        continue;
                    }
                    for cdef in &def.val.clock {
                        let mut cfg3 = cfg2.clone();
                        let mut pcfg3 = WrPortConfig::new(didx);
                        if !apply_opts(&mut cfg3.opts, &cdef.opts) {
                            continue;
                        }
                        if !apply_opts(&mut pcfg3.portopts, &cdef.portopts) {
                            continue;
                        }
                        if !apply_clock(&mut cfg3, &cdef.val, clk, clk_polarity) {
                            continue;
                        }
                        pcfg3.clkpol_kind = cdef.val.kind;
                        cfg3.wr_ports.push(pcfg3);
                        new_cfgs.push(cfg3);
                    }
                }
            }
            self.cfgs = new_cfgs;
        }
    }

    /// Assigns every source read port, either to its own port group slot or sharing
    /// with a previously assigned write port.
    fn handle_rd_ports(&mut self) {
        let lib = self.lib;
        for pidx in 0..self.mem.read_ports.len() {
            let (clk_enable, clk, clk_polarity, en) = {
                let port = &self.mem.read_ports[pidx];
                (port.clk_enable, port.clk, port.clk_polarity, port.en)
            };
            let mut new_cfgs = vec![];
            for cfg in std::mem::take(&mut self.cfgs) {
                let ram_def = &lib.ram_defs[cfg.ram_def];
                // First pass: keep the read port unshared.
                for (didx, def) in ram_def.ports.iter().enumerate() {
                    if !def.val.kind.is_read() {
                        continue;
                    }
                    // An async source port needs async hardware.
                    if !clk_enable && def.val.kind.is_sync_read() {
                        continue;
                    }
                    // Only write usage consumes arity here; read overuse is handled
                    // later by replicating the whole array.
                    let used = cfg.wr_ports.iter().filter(|pcfg| pcfg.port_def == didx).count();
                    if used >= def.val.names.len() {
                        continue;
                    }
                    let mut cfg2 = cfg.clone();
                    if !apply_opts(&mut cfg2.opts, &def.opts) {
                        continue;
                    }
                    let mut pcfg2 = RdPortConfig::new(didx);
                    if def.val.kind.is_sync_read() {
                        for cdef in &def.val.clock {
                            let mut cfg3 = cfg2.clone();
                            let mut pcfg3 = pcfg2.clone();
                            if !apply_opts(&mut cfg3.opts, &cdef.opts) {
                                continue;
                            }
                            if !apply_opts(&mut pcfg3.portopts, &cdef.portopts) {
                                continue;
                            }
                            if !apply_clock(&mut cfg3, &cdef.val, clk, clk_polarity) {
                                continue;
                            }
                            pcfg3.clkpol_kind = cdef.val.kind;
                            for endef in &def.val.rden {
                                // Enables tied to a write port make no sense without one.
                                if matches!(endef.val, RdEnKind::WriteImplies | RdEnKind::WriteExcludes) {
                                    continue;
                                }
                                let mut cfg4 = cfg3.clone();
                                let mut pcfg4 = pcfg3.clone();
                                if !apply_opts(&mut cfg4.opts, &endef.opts) {
                                    continue;
                                }
                                if !apply_opts(&mut pcfg4.portopts, &endef.portopts) {
                                    continue;
                                }
                                if endef.val == RdEnKind::None && en != Net::ONE {
                                    pcfg4.emu_en = true;
                                }
                                pcfg4.emit_en = endef.val != RdEnKind::None;
                                cfg4.rd_ports.push(pcfg4);
                                new_cfgs.push(cfg4);
                            }
                        }
                    } else {
                        pcfg2.emu_sync = clk_enable;
                        cfg2.rd_ports.push(pcfg2);
                        new_cfgs.push(cfg2);
                    }
                }
                // Second pass: share with a write port that has no reader yet.
                for wpidx in 0..self.mem.write_ports.len() {
                    let didx = cfg.wr_ports[wpidx].port_def;
                    let def = &ram_def.ports[didx];
                    if cfg.wr_ports[wpidx].rd_port.is_some() {
                        continue;
                    }
                    if def.val.kind == PortKind::Sw {
                        continue;
                    }
                    if !self.addr_compatible(wpidx, pidx) {
                        continue;
                    }
                    if def.val.kind == PortKind::Srsw {
                        let (w_clk, w_pol) =
                            (self.mem.write_ports[wpidx].clk, self.mem.write_ports[wpidx].clk_polarity);
                        if !clk_enable || clk != w_clk || clk_polarity != w_pol {
                            continue;
                        }
                    }
                    let mut cfg2 = cfg.clone();
                    cfg2.wr_ports[wpidx].rd_port = Some(pidx);
                    let mut pcfg2 = RdPortConfig::new(didx);
                    pcfg2.wr_port = Some(wpidx);
                    pcfg2.emu_sync = clk_enable && def.val.kind == PortKind::Arsw;
                    if def.val.kind == PortKind::Srsw {
                        for endef in &def.val.rden {
                            let mut cfg3 = cfg2.clone();
                            let mut pcfg3 = pcfg2.clone();
                            if !apply_wrport_opts(&mut cfg3, wpidx, endef) {
                                continue;
                            }
                            match endef.val {
                                RdEnKind::None => pcfg3.emu_en = en != Net::ONE,
                                RdEnKind::Any => (),
                                RdEnKind::WriteImplies => pcfg3.emu_en = !self.get_wr_implies_rd(wpidx, pidx),
                                RdEnKind::WriteExcludes => {
                                    if !self.get_wr_excludes_rd(wpidx, pidx) {
                                        continue;
                                    }
                                }
                            }
                            pcfg3.emit_en = endef.val != RdEnKind::None;
                            cfg3.rd_ports.push(pcfg3);
                            new_cfgs.push(cfg3);
                        }
                    } else {
                        cfg2.rd_ports.push(pcfg2);
                        new_cfgs.push(cfg2);
                    }
                }
            }
            self.cfgs = new_cfgs;
        }
    }

    /// Shared ports must agree on the address above the wide bits, modulo the x-aware
    /// signal map.
    fn addr_compatible(&self, wpidx: usize, rpidx: usize) -> bool {
        let wport = &self.mem.write_ports[wpidx];
        let rport = &self.mem.read_ports[rpidx];
        let max_wide_log2 = rport.wide_log2.max(wport.wide_log2);
        let raddr = rport.addr.slice(max_wide_log2.min(rport.addr.len())..);
        let waddr = wport.addr.slice(max_wide_log2.min(wport.addr.len())..);
        let abits = raddr.len().max(waddr.len());
        self.netlist.sigmap_xmux(&raddr.zext(abits)) == self.netlist.sigmap_xmux(&waddr.zext(abits))
    }

    fn get_wr_implies_rd(&mut self, wpidx: usize, rpidx: usize) -> bool {
        if let Some(&cached) = self.wr_implies_rd_cache.get(&(wpidx, rpidx)) {
            return cached;
        }
        let result = self.netlist.write_implies_read(self.mem, wpidx, rpidx);
        self.wr_implies_rd_cache.insert((wpidx, rpidx), result);
        result
    }

    fn get_wr_excludes_rd(&mut self, wpidx: usize, rpidx: usize) -> bool {
        if let Some(&cached) = self.wr_excludes_rd_cache.get(&(wpidx, rpidx)) {
            return cached;
        }
        let result = self.netlist.write_excludes_read(self.mem, wpidx, rpidx);
        self.wr_excludes_rd_cache.insert((wpidx, rpidx), result);
        result
    }

    /// Upholds the source's read-during-write semantics for every same-domain
    /// (write, read) pair, splitting over `wrtrans` capabilities or queuing soft
    /// transparency logic.
    fn handle_trans(&mut self) {
        if self.mem.emulate_read_first_ok() {
            let mut new_cfgs = vec![];
            for cfg in std::mem::take(&mut self.cfgs) {
                new_cfgs.push(cfg.clone());
                // This trick would break read-write port sharing.
                if cfg.rd_ports.iter().all(|pcfg| pcfg.wr_port.is_none()) {
                    let mut cfg = cfg;
                    cfg.emu_read_first = true;
                    new_cfgs.push(cfg);
                }
            }
            self.cfgs = new_cfgs;
        }
        let lib = self.lib;
        for rpidx in 0..self.mem.read_ports.len() {
            let (r_clk_enable, r_clk, r_pol) = {
                let port = &self.mem.read_ports[rpidx];
                (port.clk_enable, port.clk, port.clk_polarity)
            };
            if !r_clk_enable {
                continue;
            }
            for wpidx in 0..self.mem.write_ports.len() {
                let (w_clk_enable, w_clk, w_pol) = {
                    let port = &self.mem.write_ports[wpidx];
                    (port.clk_enable, port.clk, port.clk_polarity)
                };
                if !w_clk_enable || w_clk != r_clk || w_pol != r_pol {
                    continue;
                }
                // Same clock domain: there is a collision semantics to uphold.
                let collision_x = self.mem.read_ports[rpidx].collision_x_mask[wpidx];
                let transparency = self.mem.read_ports[rpidx].transparency_mask[wpidx];
                let mut new_cfgs = vec![];
                for mut cfg in std::mem::take(&mut self.cfgs) {
                    if collision_x && !cfg.emu_read_first {
                        new_cfgs.push(cfg);
                        continue;
                    }
                    let transparent = transparency || cfg.emu_read_first;
                    if cfg.rd_ports[rpidx].emu_sync {
                        // The extracted register gets the bypass mux directly.
                        if transparent {
                            cfg.rd_ports[rpidx].emu_trans.push(wpidx);
                        }
                        new_cfgs.push(cfg);
                    } else {
                        let rdef = &lib.ram_defs[cfg.ram_def];
                        let wpdef = &rdef.ports[cfg.wr_ports[wpidx].port_def];
                        let rpdef = &rdef.ports[cfg.rd_ports[rpidx].port_def];
                        let mut found_free = false;
                        for tdef in &wpdef.val.wrtrans {
                            match &tdef.val.target {
                                TransTarget::SelfPort => {
                                    if cfg.wr_ports[wpidx].rd_port != Some(rpidx) {
                                        continue;
                                    }
                                }
                                TransTarget::OtherPort => {
                                    if cfg.wr_ports[wpidx].rd_port == Some(rpidx) {
                                        continue;
                                    }
                                }
                                TransTarget::Named(name) => {
                                    if &rpdef.val.names[0] != name {
                                        continue;
                                    }
                                }
                            }
                            // Transparent pairs need new-data hardware, opaque pairs
                            // need old-data hardware.
                            if transparent {
                                if tdef.val.kind == TransKind::Old {
                                    continue;
                                }
                            } else if tdef.val.kind != TransKind::Old {
                                continue;
                            }
                            let mut cfg2 = cfg.clone();
                            if wrport_opts_applied(&cfg2, wpidx, tdef) {
                                found_free = true;
                            } else if !apply_wrport_opts(&mut cfg2, wpidx, tdef) {
                                continue;
                            }
                            new_cfgs.push(cfg2);
                        }
                        if !found_free && transparent {
                            // No cap, or only caps with a splitting cost: soft
                            // transparency is an alternative.
                            cfg.rd_ports[rpidx].emu_trans.push(wpidx);
                            new_cfgs.push(cfg);
                        }
                    }
                }
                self.cfgs = new_cfgs;
            }
        }
    }

    /// Upholds inter-write-port priority via `wrprio` capabilities or soft priority
    /// logic.
    fn handle_priority(&mut self) {
        let lib = self.lib;
        for p1idx in 0..self.mem.write_ports.len() {
            for p2idx in 0..self.mem.write_ports.len() {
                if !self.mem.write_ports[p2idx].priority_mask[p1idx] {
                    continue;
                }
                let mut new_cfgs = vec![];
                for mut cfg in std::mem::take(&mut self.cfgs) {
                    let rdef = &lib.ram_defs[cfg.ram_def];
                    let p1def = &rdef.ports[cfg.wr_ports[p1idx].port_def];
                    let p2def = &rdef.ports[cfg.wr_ports[p2idx].port_def];
                    let mut found_free = false;
                    for prdef in &p2def.val.wrprio {
                        if p1def.val.names[0] != prdef.val {
                            continue;
                        }
                        let mut cfg2 = cfg.clone();
                        if wrport_opts_applied(&cfg2, p2idx, prdef) {
                            found_free = true;
                        } else if !apply_wrport_opts(&mut cfg2, p2idx, prdef) {
                            continue;
                        }
                        new_cfgs.push(cfg2);
                    }
                    if !found_free {
                        cfg.wr_ports[p2idx].emu_prio.push(p1idx);
                        new_cfgs.push(cfg);
                    }
                }
                self.cfgs = new_cfgs;
            }
        }
    }

    /// Finds a `rdrstval` capability of the given kind for every sync read port that
    /// needs one, or falls back to emulation.
    fn handle_rd_reset_values(&mut self, kind: ResetKind) {
        let lib = self.lib;
        for pidx in 0..self.mem.read_ports.len() {
            let (relevant, value, en, ce_over_srst) = {
                let port = &self.mem.read_ports[pidx];
                let (relevant, value) = match kind {
                    ResetKind::Init => (port.clk_enable && !port.init_value.is_undef(), port.init_value.clone()),
                    ResetKind::Async => (
                        port.clk_enable && port.arst != Net::ZERO && !port.arst_value.is_undef(),
                        port.arst_value.clone(),
                    ),
                    ResetKind::Sync => (
                        port.clk_enable && port.srst != Net::ZERO && !port.srst_value.is_undef(),
                        port.srst_value.clone(),
                    ),
                };
                (relevant, value, port.en, port.ce_over_srst)
            };
            if !relevant {
                continue;
            }
            let mut new_cfgs = vec![];
            for mut cfg in std::mem::take(&mut self.cfgs) {
                // Emulated by an async port or a soft enable: comes for free.
                if cfg.rd_ports[pidx].emu_sync || cfg.rd_ports[pidx].emu_en {
                    new_cfgs.push(cfg);
                    continue;
                }
                let rdef = &lib.ram_defs[cfg.ram_def];
                let pdef = &rdef.ports[cfg.rd_ports[pidx].port_def];
                let mut found_free = false;
                for rstdef in &pdef.val.rdrstval {
                    if rstdef.val.kind != kind {
                        continue;
                    }
                    let mut cfg2 = cfg.clone();
                    if !apply_rstval(&mut cfg2.rd_ports[pidx], &rstdef.val, &value) {
                        continue;
                    }
                    if rdport_opts_applied(&cfg2, pidx, rstdef) {
                        found_free = true;
                    } else if !apply_rdport_opts(&mut cfg2, pidx, rstdef) {
                        continue;
                    }
                    if kind != ResetKind::Sync || en == Net::ONE {
                        new_cfgs.push(cfg2);
                    } else {
                        // An in-use enable interacts with the sync reset; split over
                        // the supported priorities and fix up mismatches with a gate.
                        for mdef in &pdef.val.rdsrstmode {
                            let mut cfg3 = cfg2.clone();
                            if mdef.val == SrstKind::SrstOverEn && ce_over_srst {
                                cfg3.rd_ports[pidx].emu_srst_en_prio = true;
                            }
                            if mdef.val == SrstKind::EnOverSrst && !ce_over_srst {
                                cfg3.rd_ports[pidx].emu_srst_en_prio = true;
                            }
                            if !apply_rdport_opts(&mut cfg3, pidx, mdef) {
                                continue;
                            }
                            new_cfgs.push(cfg3);
                        }
                    }
                }
                if !found_free {
                    match kind {
                        ResetKind::Init => cfg.rd_ports[pidx].emu_init = true,
                        ResetKind::Async => cfg.rd_ports[pidx].emu_arst = true,
                        ResetKind::Sync => cfg.rd_ports[pidx].emu_srst = true,
                    }
                    new_cfgs.push(cfg);
                }
            }
            self.cfgs = new_cfgs;
        }
    }

    /// Computes the emulation penalty and the port replication factor of every
    /// candidate.
    pub(crate) fn score_emu_ports(&mut self) {
        let lib = self.lib;
        for cfg in &mut self.cfgs {
            let rdef = &lib.ram_defs[cfg.ram_def];
            let mut port_usage_wr = vec![0usize; rdef.ports.len()];
            let mut port_usage_rd = vec![0usize; rdef.ports.len()];
            let mut score = 0;
            // 3 points per write port if read-first emulation is needed.
            if cfg.emu_read_first {
                score += 3 * cfg.wr_ports.len();
            }
            for pcfg in &cfg.wr_ports {
                // 1 point per priority fixup, a gate per distinct enable pair.
                score += pcfg.emu_prio.len();
                port_usage_wr[pcfg.port_def] += 1;
            }
            for pcfg in &cfg.rd_ports {
                // 3 points per soft transparency instance: registers and muxes.
                score += 3 * pcfg.emu_trans.len();
                // 3 points for a soft enable, which subsumes init/reset emulation.
                if pcfg.emu_en {
                    score += 3;
                }
                // 2 points per soft init/reset value: a bit of register and muxes.
                if pcfg.emu_init {
                    score += 2;
                }
                if pcfg.emu_arst {
                    score += 2;
                }
                if pcfg.emu_srst {
                    score += 2;
                }
                // 1 point for a wrong enable/reset priority, fixed with one gate.
                if pcfg.emu_srst_en_prio {
                    score += 1;
                }
                // 1 point per unshared read port, to prefer shared configurations.
                if pcfg.wr_port.is_none() {
                    score += 1;
                    port_usage_rd[pcfg.port_def] += 1;
                }
            }
            cfg.score_emu = score;
            let mut repl_port = 1;
            for (gidx, def) in rdef.ports.iter().enumerate() {
                let space = def.val.names.len() - port_usage_wr[gidx];
                if port_usage_rd[gidx] > 0 {
                    assert!(space > 0);
                    repl_port = repl_port.max(port_usage_rd[gidx].div_ceil(space));
                }
            }
            cfg.repl_port = repl_port;
        }
    }

    /// Removes geometry-equivalent duplicates, keeping the lowest emulation score in
    /// each class.
    pub(crate) fn prune_pre_geom(&mut self) {
        let mut kept: Vec<MemConfig> = vec![];
        'next: for cfg in std::mem::take(&mut self.cfgs) {
            for other in &mut kept {
                if same_geom(&cfg, other) {
                    if cfg.score_emu < other.score_emu {
                        *other = cfg;
                    }
                    continue 'next;
                }
            }
            kept.push(cfg);
        }
        self.cfgs = kept;
    }

    pub(crate) fn dump_configs(&self, stage: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        debug!("memory {} mapping candidates ({}):", self.mem.id, stage);
        if self.logic_ok {
            debug!("- logic fallback");
        }
        for cfg in &self.cfgs {
            self.dump_config(cfg);
        }
    }

    fn dump_config(&self, cfg: &MemConfig) {
        let rdef = &self.lib.ram_defs[cfg.ram_def];
        debug!("- {}:", rdef.id);
        for (name, value) in &cfg.opts {
            debug!("  - option {} {:?}", name, value);
        }
        debug!("  - emulation score: {}", cfg.score_emu);
        debug!("  - replicates (for ports): {}", cfg.repl_port);
        debug!("  - replicates (for data): {}", cfg.repl_d);
        debug!("  - mux score: {}; demux score: {}; cost: {}", cfg.score_mux, cfg.score_demux, cfg.cost);
        if cfg.emu_read_first {
            debug!("  - emulate read-first behavior");
        }
        for (pidx, pcfg) in cfg.wr_ports.iter().enumerate() {
            let pdef = &rdef.ports[pcfg.port_def].val;
            match pcfg.rd_port {
                None => debug!("  - write port {}: port group {}", pidx, pdef.names[0]),
                Some(rpidx) => {
                    debug!("  - write port {}: port group {} (shared with read port {})", pidx, pdef.names[0], rpidx)
                }
            }
            for (name, value) in &pcfg.portopts {
                debug!("    - option {} {:?}", name, value);
            }
            for opidx in &pcfg.emu_prio {
                debug!("    - emulate priority over write port {}", opidx);
            }
        }
        for (pidx, pcfg) in cfg.rd_ports.iter().enumerate() {
            let pdef = &rdef.ports[pcfg.port_def].val;
            match pcfg.wr_port {
                None => debug!("  - read port {}: port group {}", pidx, pdef.names[0]),
                Some(wpidx) => {
                    debug!("  - read port {}: port group {} (shared with write port {})", pidx, pdef.names[0], wpidx)
                }
            }
            for (name, value) in &pcfg.portopts {
                debug!("    - option {} {:?}", name, value);
            }
            if pcfg.emu_sync {
                debug!("    - emulate data register");
            }
            if pcfg.emu_en {
                debug!("    - emulate clock enable");
            }
            if pcfg.emu_arst {
                debug!("    - emulate async reset");
            }
            if pcfg.emu_srst {
                debug!("    - emulate sync reset");
            }
            if pcfg.emu_init {
                debug!("    - emulate init value");
            }
            if pcfg.emu_srst_en_prio {
                debug!("    - emulate sync reset / enable priority");
            }
            for opidx in &pcfg.emu_trans {
                debug!("    - emulate transparency with write port {}", opidx);
            }
        }
    }
}
