//! Geometry planning: choosing dims, byte width, per-port widths, the base data
//! width, the hard-wide address bits, and the replication factors that minimize the
//! cost of a candidate.

use indexmap::map::Entry;
use indexmap::IndexMap;
use log::debug;

use ramforge_netlist::Netlist;

use crate::library::{apply_opts, opts_applied, MemoryDimsDef, RamKind};
use crate::mapping::{apply_rdport_opts, apply_wrport_opts, MemMapping};

const FACTOR_MUX: f64 = 0.5;
const FACTOR_DEMUX: f64 = 0.5;
const FACTOR_EMU: f64 = 2.0;

pub(crate) fn ceil_log2(value: usize) -> usize {
    if value <= 1 {
        0
    } else {
        (usize::BITS - (value - 1).leading_zeros()) as usize
    }
}

/// Translates a per-port width list into an inclusive range of `dbits` indices.
pub(crate) fn xlat_width_range(dims: &MemoryDimsDef, widths: &[usize]) -> (usize, usize) {
    if widths.is_empty() {
        return (0, dims.dbits.len() - 1);
    }
    for i in 0..dims.dbits.len() {
        if dims.dbits[i] == widths[0] {
            return (i, i + widths.len() - 1);
        }
    }
    unreachable!("validated port width not found in dbits progression");
}

impl<'a, N: Netlist> MemMapping<'a, N> {
    /// Splits candidates over dims, byte-width, and per-port width capabilities.
    /// Shared read ports inherit the width choice of their write port.
    pub(crate) fn handle_geom_split(&mut self) {
        let lib = self.lib;
        let mut new_cfgs = vec![];
        for cfg in std::mem::take(&mut self.cfgs) {
            let rdef = &lib.ram_defs[cfg.ram_def];
            for (didx, ddef) in rdef.dims.iter().enumerate() {
                let mut cfg2 = cfg.clone();
                if !apply_opts(&mut cfg2.opts, &ddef.opts) {
                    continue;
                }
                cfg2.dims_def = didx;
                new_cfgs.push(cfg2);
            }
        }
        self.cfgs = new_cfgs;

        let mut new_cfgs = vec![];
        for mut cfg in std::mem::take(&mut self.cfgs) {
            let rdef = &lib.ram_defs[cfg.ram_def];
            let mut found_free = false;
            for bdef in &rdef.byte {
                let mut cfg2 = cfg.clone();
                if opts_applied(&cfg2.opts, &bdef.opts) {
                    found_free = true;
                } else if !apply_opts(&mut cfg2.opts, &bdef.opts) {
                    continue;
                }
                cfg2.byte = bdef.val;
                new_cfgs.push(cfg2);
            }
            if !found_free {
                cfg.byte = 0;
                new_cfgs.push(cfg);
            }
        }
        self.cfgs = new_cfgs;

        for pidx in 0..self.mem.write_ports.len() {
            let mut new_cfgs = vec![];
            for cfg in std::mem::take(&mut self.cfgs) {
                let rdef = &lib.ram_defs[cfg.ram_def];
                let pdef = &rdef.ports[cfg.wr_ports[pidx].port_def];
                for (widx, wdef) in pdef.val.width.iter().enumerate() {
                    let mut cfg2 = cfg.clone();
                    if !apply_wrport_opts(&mut cfg2, pidx, wdef) {
                        continue;
                    }
                    cfg2.wr_ports[pidx].width_def = widx;
                    new_cfgs.push(cfg2);
                }
            }
            self.cfgs = new_cfgs;
        }
        for pidx in 0..self.mem.read_ports.len() {
            let mut new_cfgs = vec![];
            for mut cfg in std::mem::take(&mut self.cfgs) {
                if let Some(wpidx) = cfg.rd_ports[pidx].wr_port {
                    cfg.rd_ports[pidx].width_def = cfg.wr_ports[wpidx].width_def;
                    new_cfgs.push(cfg);
                    continue;
                }
                let rdef = &lib.ram_defs[cfg.ram_def];
                let pdef = &rdef.ports[cfg.rd_ports[pidx].port_def];
                for (widx, wdef) in pdef.val.width.iter().enumerate() {
                    let mut cfg2 = cfg.clone();
                    if !apply_rdport_opts(&mut cfg2, pidx, wdef) {
                        continue;
                    }
                    cfg2.rd_ports[pidx].width_def = widx;
                    new_cfgs.push(cfg2);
                }
            }
            self.cfgs = new_cfgs;
        }
    }

    /// For every candidate, searches base widths and hard-wide masks for the cheapest
    /// realizable geometry, recording it in the candidate.
    pub(crate) fn handle_geom(&mut self) {
        let lib = self.lib;
        let mem = &*self.mem;
        // Byte boundaries: positions in the source word where some write port's
        // enable differs from the previous bit.  Bit 0 always starts a byte.
        let mut byte_boundary = vec![false; mem.width];
        if mem.width > 0 {
            byte_boundary[0] = true;
        }
        for port in &mem.write_ports {
            for sub in 0..(1usize << port.wide_log2) {
                for i in 1..mem.width {
                    let pos = sub * mem.width + i;
                    if port.en[pos] != port.en[pos - 1] {
                        byte_boundary[i] = true;
                    }
                }
            }
        }
        let wren_size = Vec::from_iter(
            mem.write_ports.iter().map(|port| port.en.iter().collect::<std::collections::BTreeSet<_>>().len()),
        );
        let max_wr_wide_log2 = mem.write_ports.iter().map(|port| port.wide_log2).max().unwrap_or(0);
        let max_wide_log2 =
            max_wr_wide_log2.max(mem.read_ports.iter().map(|port| port.wide_log2).max().unwrap_or(0));
        let debug_geom = lib.opts.debug_geom;

        for cfg in &mut self.cfgs {
            let rdef = &lib.ram_defs[cfg.ram_def];
            let dims = &rdef.dims[cfg.dims_def].val;
            let mut got_config = false;
            let mut best_cost = 0.0f64;
            let wr_width_range = Vec::from_iter(cfg.wr_ports.iter().map(|pcfg| {
                let wdef = &rdef.ports[pcfg.port_def].val.width[pcfg.width_def].val;
                xlat_width_range(dims, &wdef.wr_widths)
            }));
            let rd_width_range = Vec::from_iter(cfg.rd_ports.iter().map(|pcfg| {
                let wdef = &rdef.ports[pcfg.port_def].val.width[pcfg.width_def].val;
                xlat_width_range(dims, if wdef.tied { &wdef.wr_widths } else { &wdef.rd_widths })
            }));
            let mut byte_width_log2 = 0;
            for i in 0..dims.dbits.len() {
                if cfg.byte >= dims.dbits[i] {
                    byte_width_log2 = i;
                }
            }
            if cfg.byte == 0 {
                byte_width_log2 = dims.dbits.len() - 1;
            }
            // Classify wide address bits as uniform (write enables identical across
            // both halves) or not.  Only uniform bits can be absorbed into the data
            // width without disturbing write granularity.
            let mut wide_nu_start = max_wide_log2;
            let mut wide_nu_end = max_wr_wide_log2;
            for (pidx, port) in mem.write_ports.iter().enumerate() {
                for j in 0..port.wide_log2 {
                    let mut uniform = true;
                    let chunk = mem.width << j;
                    for k in (0..(1usize << port.wide_log2)).step_by(2 << j) {
                        let lo = port.en.slice(k * mem.width..k * mem.width + chunk);
                        let hi_start = (k + (1 << j)) * mem.width;
                        let hi = port.en.slice(hi_start..hi_start + chunk);
                        if lo != hi {
                            uniform = false;
                        }
                    }
                    if !uniform {
                        wide_nu_start = wide_nu_start.min(j);
                        break;
                    }
                }
                let pcfg = &cfg.wr_ports[pidx];
                let wdef = &rdef.ports[pcfg.port_def].val.width[pcfg.width_def].val;
                if wdef.tied {
                    if let Some(rpidx) = pcfg.rd_port {
                        // A wider tied shared read port forces artificial widening
                        // of the write path, with non-uniform enables on the added
                        // bits.
                        let rport = &mem.read_ports[rpidx];
                        if rport.wide_log2 > port.wide_log2 {
                            wide_nu_start = wide_nu_start.min(port.wide_log2);
                            wide_nu_end = wide_nu_end.max(rport.wide_log2);
                        }
                    }
                }
            }
            let mut start_base = dims.dbits.len() - 1;
            for &(lo, _) in wr_width_range.iter().chain(&rd_width_range) {
                start_base = start_base.min(lo);
            }
            for base_width_log2 in start_base..dims.dbits.len() {
                // The usable width may be clamped below the base width by a
                // maximum-width constraint; such configurations are only useful to
                // satisfy a minimum-width constraint.
                let mut unit_width_log2 = base_width_log2;
                for &(_, hi) in wr_width_range.iter().chain(&rd_width_range) {
                    unit_width_log2 = unit_width_log2.min(hi);
                }
                if unit_width_log2 != base_width_log2 && got_config {
                    break;
                }
                let unit_width = dims.dbits[unit_width_log2];
                let mut effective_byte = cfg.byte;
                if cfg.byte == 0 || cfg.byte > unit_width {
                    effective_byte = unit_width;
                }
                if mem.write_ports.is_empty() {
                    effective_byte = 1;
                }
                assert!(unit_width % effective_byte == 0);
                // Pad the source word so every byte boundary lands on a hardware
                // write-enable boundary.
                let mut swizzle = vec![];
                for i in 0..mem.width {
                    if byte_boundary[i] {
                        while swizzle.len() % effective_byte != 0 {
                            swizzle.push(None);
                        }
                    }
                    swizzle.push(Some(i));
                }
                while swizzle.len() % effective_byte != 0 {
                    swizzle.push(None);
                }

                let mut hard_wide_mask: u32 = 0;
                let mut hard_wide_num = 0usize;
                let mut byte_failed = false;
                'hard_wide: loop {
                    // Minimum width constraints only bind write ports below byte
                    // width; anything else can emulate a narrow write with enables.
                    let mut min_width_ok = true;
                    let mut min_width_bit = wide_nu_start;
                    for (pidx, port) in mem.write_ports.iter().enumerate() {
                        let mut w = base_width_log2;
                        for i in 0..port.wide_log2 {
                            if hard_wide_mask & (1 << i) != 0 {
                                w += 1;
                            }
                        }
                        if w < wr_width_range[pidx].0 && w < byte_width_log2 {
                            min_width_ok = false;
                            min_width_bit = min_width_bit.min(port.wide_log2);
                        }
                    }
                    if min_width_ok {
                        let emu_wide_bits = max_wide_log2 - hard_wide_num;
                        let mult_wide = 1usize << emu_wide_bits;
                        let addrs = 1i64 << (dims.abits - base_width_log2 + emu_wide_bits);
                        let min_addr = i64::from(mem.start_offset) / addrs;
                        let max_addr = (i64::from(mem.start_offset) + mem.size as i64 - 1) / addrs;
                        let mult_a = (max_addr - min_addr + 1) as usize;
                        let bits = mult_a * mult_wide * swizzle.len();
                        let repl = bits.div_ceil(unit_width);
                        let mut score_demux = 0usize;
                        for (pidx, port) in mem.write_ports.iter().enumerate() {
                            let mut w = emu_wide_bits;
                            for i in 0..port.wide_log2 {
                                if hard_wide_mask & (1 << i) == 0 {
                                    w -= 1;
                                }
                            }
                            if w != 0 || mult_a != 1 {
                                score_demux += (mult_a << w) * wren_size[pidx];
                            }
                        }
                        let mut score_mux = 0usize;
                        for port in &mem.read_ports {
                            let mut w = emu_wide_bits;
                            for i in 0..port.wide_log2 {
                                if hard_wide_mask & (1 << i) == 0 {
                                    w -= 1;
                                }
                            }
                            score_mux += ((mult_a << w) - 1) * port.data.len();
                        }
                        let cost = dims.cost * repl as f64 * cfg.repl_port as f64
                            + score_mux as f64 * FACTOR_MUX
                            + score_demux as f64 * FACTOR_DEMUX
                            + cfg.score_emu as f64 * FACTOR_EMU;
                        if debug_geom {
                            debug!(
                                "{}: geometry base_width={} hard_wide={:#b} repl_d={} mux={} demux={} cost={}",
                                mem.id, dims.dbits[base_width_log2], hard_wide_mask, repl, score_mux, score_demux,
                                cost
                            );
                        }
                        if !got_config || cost < best_cost {
                            cfg.base_width_log2 = base_width_log2;
                            cfg.unit_width_log2 = unit_width_log2;
                            cfg.swizzle = swizzle.clone();
                            cfg.hard_wide_mask = hard_wide_mask;
                            cfg.emu_wide_mask = ((1u32 << max_wide_log2) - 1) & !hard_wide_mask;
                            cfg.repl_d = repl;
                            cfg.score_demux = score_demux;
                            cfg.score_mux = score_mux;
                            cfg.cost = cost;
                            best_cost = cost;
                            got_config = true;
                        }
                    }
                    if dims.tied {
                        break;
                    }
                    // Extend the hard wide mask by one more address bit.  Preference
                    // order: bits working toward an unmet minimum width, then low
                    // uniform bits (to reach byte width), then the rest, and bits
                    // only involved in reads as a last resort.
                    'pick: loop {
                        let (scan_from, scan_to, retry) = if !min_width_ok {
                            (min_width_bit as i32, 0, false)
                        } else if byte_failed {
                            (max_wide_log2 as i32, wide_nu_end as i32, false)
                        } else if base_width_log2 + hard_wide_num < byte_width_log2 {
                            (wide_nu_start as i32, 0, true)
                        } else {
                            (max_wide_log2 as i32, 0, false)
                        };
                        let mut bit = scan_from - 1;
                        while bit >= scan_to && hard_wide_mask & (1u32 << bit as u32) != 0 {
                            bit -= 1;
                        }
                        let mut failed = bit < scan_to;
                        if !failed {
                            let new_mask = hard_wide_mask | (1u32 << bit as u32);
                            for (pidx, port) in mem.write_ports.iter().enumerate() {
                                let mut w = base_width_log2;
                                for i in 0..port.wide_log2 {
                                    if new_mask & (1 << i) != 0 {
                                        w += 1;
                                    }
                                }
                                if w > wr_width_range[pidx].1 {
                                    failed = true;
                                }
                            }
                            for (rpidx, port) in mem.read_ports.iter().enumerate() {
                                let mut w = base_width_log2;
                                for i in 0..port.wide_log2 {
                                    if new_mask & (1 << i) != 0 {
                                        w += 1;
                                    }
                                }
                                if w > rd_width_range[rpidx].1 {
                                    failed = true;
                                }
                            }
                            if !failed {
                                hard_wide_mask = new_mask;
                                hard_wide_num += 1;
                                break 'pick;
                            }
                        }
                        if retry {
                            byte_failed = true;
                            continue 'pick;
                        }
                        break 'hard_wide;
                    }
                }
            }
            assert!(got_config, "no feasible geometry for candidate");
        }
    }

    /// Keeps only the cheapest candidate per hardware resource.
    pub(crate) fn prune_post_geom(&mut self) {
        let lib = self.lib;
        let mut keep = vec![true; self.cfgs.len()];
        let mut rsrc: IndexMap<String, usize> = IndexMap::new();
        for i in 0..self.cfgs.len() {
            let cfg = &self.cfgs[i];
            let rdef = &lib.ram_defs[cfg.ram_def];
            let dims = &rdef.dims[cfg.dims_def].val;
            let key = match &dims.resource_name {
                Some(name) => name.clone(),
                None => match rdef.kind {
                    RamKind::Distributed => "[distributed]".to_owned(),
                    RamKind::Block => "[block]".to_owned(),
                    RamKind::Huge => "[huge]".to_owned(),
                    _ => String::new(),
                },
            };
            match rsrc.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(i);
                }
                Entry::Occupied(mut entry) => {
                    let slot = *entry.get();
                    if cfg.cost < self.cfgs[slot].cost {
                        keep[slot] = false;
                        *entry.get_mut() = i;
                    } else {
                        keep[i] = false;
                    }
                }
            }
        }
        let mut keep = keep.into_iter();
        self.cfgs.retain(|_| keep.next().unwrap());
    }
}

#[cfg(test)]
mod test {
    use super::ceil_log2;

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(16), 4);
        assert_eq!(ceil_log2(17), 5);
    }
}
