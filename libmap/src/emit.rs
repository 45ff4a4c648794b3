//! Emission of the chosen configuration: applies the queued emulations to the source
//! memory, then instantiates and wires the replicated cell array.

use log::info;

use ramforge_netlist::{Const, Net, Netlist, ParamValue, RamCell, Trit, Value};

use crate::geometry::{ceil_log2, xlat_width_range};
use crate::library::{ClkPolKind, OptValue, PortKind};
use crate::mapping::{MemConfig, MemMapping};

/// Where one hardware data bit comes from: which soft mux leg, which source address,
/// and which bit of the port data.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SwizzleBit {
    pub mux_idx: usize,
    pub addr: i64,
    pub bit: usize,
}

/// The mapping from hardware (replica, data bit) slots to source bits, for one port
/// widening.
#[derive(Debug, Clone)]
pub(crate) struct Swizzle {
    pub addr_shift: usize,
    pub addr_mux_bits: Vec<usize>,
    pub bits: Vec<Vec<Option<SwizzleBit>>>,
}

fn opt_param(value: &OptValue) -> ParamValue {
    match value {
        OptValue::Int(value) => ParamValue::Int(*value),
        OptValue::String(value) => ParamValue::String(value.clone()),
    }
}

impl<'a, N: Netlist> MemMapping<'a, N> {
    /// Computes the swizzle of a port accessing the array at `sw_wide_log2` source
    /// wide bits through a hardware port `hw_wide_log2` wide.
    pub(crate) fn gen_swizzle(&self, cfg: &MemConfig, sw_wide_log2: usize, hw_wide_log2: usize) -> Swizzle {
        let lib = self.lib;
        let dims = &lib.ram_defs[cfg.ram_def].dims[cfg.dims_def].val;
        let mem = &*self.mem;

        let mut emu_wide_bits = vec![];
        let mut hard_wide_bits = vec![];
        for i in 0..ceil_log2(mem.size) {
            if cfg.emu_wide_mask & (1 << i) != 0 {
                emu_wide_bits.push(i);
            } else if (hard_wide_bits.len() as isize) < hw_wide_log2 as isize - cfg.base_width_log2 as isize {
                hard_wide_bits.push(i);
            }
        }
        let mut addr_mux_bits = vec![];
        for &bit in &hard_wide_bits {
            if bit >= sw_wide_log2 {
                addr_mux_bits.push(bit);
            }
        }
        for &bit in &emu_wide_bits {
            if bit >= sw_wide_log2 {
                addr_mux_bits.push(bit);
            }
        }

        let addr_shift = dims.abits - cfg.base_width_log2 + emu_wide_bits.len();
        let unit = 1i64 << addr_shift;
        let addr_start = i64::from(mem.start_offset) & !(unit - 1);
        let addr_end = ((i64::from(mem.start_offset) + mem.size as i64 - 1) | (unit - 1)) + 1;
        let hnum = ((addr_end - addr_start) >> addr_shift) as usize;
        let unit_width = dims.dbits[cfg.unit_width_log2];
        let mut bits = vec![vec![None; dims.dbits[hw_wide_log2]]; cfg.repl_d];

        for hi in 0..hnum {
            for ewi in 0..(1usize << emu_wide_bits.len()) {
                for hwi in 0..(1usize << hard_wide_bits.len()) {
                    let mut mux_idx = 0usize;
                    let mut sub = 0usize;
                    let mut mib = 0usize;
                    let mut hbit_base = 0usize;
                    for (i, &bit) in hard_wide_bits.iter().enumerate() {
                        if bit < sw_wide_log2 {
                            if hwi & (1 << i) != 0 {
                                sub |= 1 << bit;
                            }
                        } else {
                            if hwi & (1 << i) != 0 {
                                mux_idx |= 1 << mib;
                            }
                            mib += 1;
                        }
                        if hwi & (1 << i) != 0 {
                            hbit_base += dims.dbits[i + cfg.base_width_log2];
                        }
                    }
                    for (i, &bit) in emu_wide_bits.iter().enumerate() {
                        if bit < sw_wide_log2 {
                            if ewi & (1 << i) != 0 {
                                sub |= 1 << bit;
                            }
                        } else {
                            if ewi & (1 << i) != 0 {
                                mux_idx |= 1 << mib;
                            }
                            mib += 1;
                        }
                    }
                    mux_idx |= hi << mib;
                    let mut addr = addr_start + ((hi as i64) << addr_shift);
                    for (i, &mux_bit) in addr_mux_bits.iter().enumerate() {
                        if mux_idx & (1 << i) != 0 {
                            addr += 1i64 << mux_bit;
                        }
                    }
                    for (bit_pos, slot) in cfg.swizzle.iter().enumerate() {
                        let Some(src) = *slot else { continue };
                        let rbit = bit_pos + cfg.swizzle.len() * (ewi + (hi << emu_wide_bits.len()));
                        let rep = rbit / unit_width;
                        let hbit = hbit_base + rbit % unit_width;
                        bits[rep][hbit] = Some(SwizzleBit { mux_idx, addr, bit: src + sub * mem.width });
                    }
                }
            }
        }

        Swizzle { addr_shift, addr_mux_bits, bits }
    }

    /// Rewrites the memory per the configuration's emulation flags, then builds the
    /// `repl_port × repl_d` cell array with all parameters and port wiring.
    pub(crate) fn emit(&mut self, cfg: &MemConfig) {
        let lib = self.lib;
        let rdef = &lib.ram_defs[cfg.ram_def];
        let dims = &rdef.dims[cfg.dims_def].val;
        info!("mapping memory {} via {}", self.mem.id, rdef.id);

        // Apply emulations, highest-level first per port.
        if cfg.emu_read_first {
            self.netlist.emulate_read_first(self.mem);
        }
        for pidx in 0..self.mem.read_ports.len() {
            let pcfg = &cfg.rd_ports[pidx];
            if pcfg.emu_sync {
                self.netlist.extract_read_dff(self.mem, pidx);
            } else if pcfg.emu_en {
                self.netlist.emulate_read_enable(self.mem, pidx);
            } else {
                if pcfg.emu_srst_en_prio {
                    if self.mem.read_ports[pidx].ce_over_srst {
                        self.netlist.emulate_read_ce_over_srst(self.mem, pidx);
                    } else {
                        self.netlist.emulate_read_srst_over_ce(self.mem, pidx);
                    }
                }
                self.netlist.emulate_reset(self.mem, pidx, pcfg.emu_init, pcfg.emu_arst, pcfg.emu_srst);
            }
        }
        for pidx in 0..self.mem.write_ports.len() {
            for &opidx in &cfg.wr_ports[pidx].emu_prio {
                self.netlist.emulate_priority(self.mem, opidx, pidx);
            }
        }
        for pidx in 0..self.mem.read_ports.len() {
            for &opidx in &cfg.rd_ports[pidx].emu_trans {
                // The pair may no longer be transparent after the register
                // extraction or priority fixups above.
                if self.mem.read_ports[pidx].transparency_mask[opidx] {
                    self.netlist.emulate_transparency(self.mem, opidx, pidx);
                }
            }
        }

        // Distribute source ports over (replica, port group, slot).  Write ports
        // occupy their slot in every replica; each unshared read port lands in the
        // first replica with a free slot.
        let mut ports: Vec<Vec<Vec<(Option<usize>, Option<usize>)>>> =
            vec![vec![vec![]; rdef.ports.len()]; cfg.repl_port];
        for (pidx, pcfg) in cfg.wr_ports.iter().enumerate() {
            for (rp, repl) in ports.iter_mut().enumerate() {
                repl[pcfg.port_def].push((Some(pidx), if rp == 0 { pcfg.rd_port } else { None }));
            }
        }
        for (pidx, pcfg) in cfg.rd_ports.iter().enumerate() {
            if pcfg.wr_port.is_some() {
                continue;
            }
            let arity = rdef.ports[pcfg.port_def].val.names.len();
            let repl = ports.iter_mut().find(|repl| repl[pcfg.port_def].len() < arity).unwrap();
            repl[pcfg.port_def].push((None, Some(pidx)));
        }

        let init_swz = self.gen_swizzle(cfg, 0, dims.dbits.len() - 1);
        let init_data = self.mem.get_init_data().clone();

        // Maps hardware address bits back to source address bits; the low
        // base-width bits address inside the hardware word.
        let mut hw_addr_swizzle: Vec<Option<usize>> = vec![None; cfg.base_width_log2];
        for i in 0..init_swz.addr_shift {
            if cfg.emu_wide_mask & (1 << i) == 0 {
                hw_addr_swizzle.push(Some(i));
            }
        }
        assert_eq!(hw_addr_swizzle.len(), dims.abits);

        let mut pnedge_clocks = vec![];
        for (name, &(net, flip)) in &cfg.clocks_pnedge {
            let mut clk = Value::from(net);
            if flip {
                clk = self.netlist.add_not(&clk);
            }
            pnedge_clocks.push((name.clone(), clk));
        }

        let start_offset = i64::from(self.mem.start_offset);
        let size = self.mem.size as i64;
        let mut cells: Vec<Vec<RamCell>> = vec![];
        for rp in 0..cfg.repl_port {
            let mut row = vec![];
            for rd in 0..cfg.repl_d {
                let mut cell = RamCell::new(format!("{}.{}.{}", self.mem.id, rp, rd), rdef.id.clone());
                cell.set_param("ABITS", dims.abits);
                cell.set_param("BYTE", cfg.byte);
                if dims.tied {
                    cell.set_param("WIDTH", dims.dbits[cfg.base_width_log2]);
                }
                for (name, value) in &cfg.opts {
                    cell.set_param(format!("OPTION_{}", name), opt_param(value));
                }
                for (name, &(net, polarity)) in &cfg.clocks_anyedge {
                    cell.set_param(format!("CLKPOL_{}", name), polarity);
                    cell.set_port(format!("CLK_{}", name), Value::from(net));
                }
                for (name, clk) in &pnedge_clocks {
                    cell.set_port(format!("CLK_{}", name), clk.clone());
                }
                // The INIT parameter covers the full hardware address space, one
                // maximum-width word per hardware row.
                let mut initval = Const::new();
                for hwa in (0..(1usize << dims.abits)).step_by(1usize << (dims.dbits.len() - 1)) {
                    for slot in &init_swz.bits[rd] {
                        let Some(bit) = slot else {
                            initval.push(Trit::Undef);
                            continue;
                        };
                        let mut addr = bit.addr;
                        for i in (dims.dbits.len() - 1)..dims.abits {
                            if hwa & (1 << i) != 0 {
                                addr += 1i64 << hw_addr_swizzle[i].unwrap();
                            }
                        }
                        if addr >= start_offset && addr < start_offset + size {
                            initval.push(init_data[((addr - start_offset) as usize) * self.mem.width + bit.bit]);
                        } else {
                            initval.push(Trit::Undef);
                        }
                    }
                }
                cell.set_param("INIT", initval);
                row.push(cell);
            }
            cells.push(row);
        }

        for rp in 0..cfg.repl_port {
            for (pgi, pgdef) in rdef.ports.iter().enumerate() {
                let pdef = &pgdef.val;
                for (pi, pname) in pdef.names.iter().enumerate() {
                    if pi >= ports[rp][pgi].len() {
                        for cell in &mut cells[rp] {
                            cell.set_param(format!("PORT_{}_USED", pname), false);
                        }
                        continue;
                    }
                    let (wpidx, rpidx) = ports[rp][pgi][pi];
                    for cell in &mut cells[rp] {
                        cell.set_param(format!("PORT_{}_USED", pname), true);
                        if matches!(pdef.kind, PortKind::Srsw | PortKind::Arsw) {
                            cell.set_param(format!("PORT_{}_WR_USED", pname), wpidx.is_some());
                            cell.set_param(format!("PORT_{}_RD_USED", pname), rpidx.is_some());
                        }
                    }

                    let addr;
                    let width_def;
                    let mut wide_log2;
                    let mut wr_wide_log2 = 0;
                    let mut rd_wide_log2 = 0;
                    let mut clk = Value::from(Net::ZERO);
                    let mut clk_pol = true;
                    let mut clkpol_kind = ClkPolKind::Posedge;
                    if let Some(wp) = wpidx {
                        let wpcfg = &cfg.wr_ports[wp];
                        for cell in &mut cells[rp] {
                            for (name, value) in &wpcfg.portopts {
                                cell.set_param(format!("PORT_{}_OPTION_{}", pname, name), opt_param(value));
                            }
                        }
                        let wport = &self.mem.write_ports[wp];
                        clk = Value::from(wport.clk);
                        clk_pol = wport.clk_polarity;
                        clkpol_kind = wpcfg.clkpol_kind;
                        let mut port_addr = wport.addr.clone();
                        width_def = wpcfg.width_def;
                        wr_wide_log2 = wport.wide_log2;
                        wide_log2 = wport.wide_log2;
                        if let Some(rpidx) = rpidx {
                            let rport = &self.mem.read_ports[rpidx];
                            rd_wide_log2 = rport.wide_log2;
                            if rd_wide_log2 > wr_wide_log2 {
                                wide_log2 = rd_wide_log2;
                            } else {
                                port_addr = rport.addr.clone();
                            }
                        }
                        addr = port_addr;
                    } else {
                        let rpidx = rpidx.unwrap();
                        let rpcfg = &cfg.rd_ports[rpidx];
                        for cell in &mut cells[rp] {
                            for (name, value) in &rpcfg.portopts {
                                cell.set_param(format!("PORT_{}_OPTION_{}", pname, name), opt_param(value));
                            }
                        }
                        let rport = &self.mem.read_ports[rpidx];
                        if rport.clk_enable {
                            clk = Value::from(rport.clk);
                            clk_pol = rport.clk_polarity;
                            clkpol_kind = rpcfg.clkpol_kind;
                        }
                        addr = rport.addr.clone();
                        width_def = rpcfg.width_def;
                        rd_wide_log2 = rport.wide_log2;
                        wide_log2 = rport.wide_log2;
                    }
                    let addr = self.netlist.sigmap_xmux(&addr);

                    if pdef.kind != PortKind::Ar {
                        match clkpol_kind {
                            ClkPolKind::Posedge => {
                                if !clk_pol {
                                    clk = self.netlist.add_not(&clk);
                                }
                            }
                            ClkPolKind::Negedge => {
                                if clk_pol {
                                    clk = self.netlist.add_not(&clk);
                                }
                            }
                            ClkPolKind::Anyedge => {
                                for cell in &mut cells[rp] {
                                    cell.set_param(format!("PORT_{}_CLKPOL", pname), clk_pol);
                                }
                            }
                        }
                        for cell in &mut cells[rp] {
                            cell.set_port(format!("PORT_{}_CLK", pname), clk.clone());
                        }
                    }

                    // Effective hardware widths: the base width plus the hard wide
                    // bits within the port's widening, clamped into the port's
                    // allowed width range.
                    let wdef = &pdef.width[width_def].val;
                    let wr_range = xlat_width_range(dims, &wdef.wr_widths);
                    let rd_range = xlat_width_range(dims, &wdef.rd_widths);
                    if wdef.tied {
                        wr_wide_log2 = wide_log2;
                        rd_wide_log2 = wide_log2;
                    }
                    let mut hw_wr_wide_log2 = cfg.base_width_log2;
                    for i in 0..wr_wide_log2 {
                        if cfg.hard_wide_mask & (1 << i) != 0 {
                            hw_wr_wide_log2 += 1;
                        }
                    }
                    let hw_wr_wide_log2 = hw_wr_wide_log2.clamp(wr_range.0, wr_range.1);
                    let mut hw_rd_wide_log2 = cfg.base_width_log2;
                    for i in 0..rd_wide_log2 {
                        if cfg.hard_wide_mask & (1 << i) != 0 {
                            hw_rd_wide_log2 += 1;
                        }
                    }
                    let hw_rd_wide_log2 = hw_rd_wide_log2.clamp(rd_range.0, rd_range.1);
                    if !dims.tied {
                        for cell in &mut cells[rp] {
                            if wdef.tied {
                                cell.set_param(format!("PORT_{}_WIDTH", pname), dims.dbits[hw_wr_wide_log2]);
                            } else {
                                if wpidx.is_some() {
                                    cell.set_param(format!("PORT_{}_WR_WIDTH", pname), dims.dbits[hw_wr_wide_log2]);
                                }
                                if rpidx.is_some() {
                                    cell.set_param(format!("PORT_{}_RD_WIDTH", pname), dims.dbits[hw_rd_wide_log2]);
                                }
                            }
                        }
                    }

                    // Project the source address through the hardware address
                    // swizzle; the low hard-wide bits are tied to zero.
                    let mut hw_addr: Vec<Net> = hw_addr_swizzle
                        .iter()
                        .map(|slot| match slot {
                            Some(bit) if *bit < addr.len() => addr[*bit],
                            _ => Net::ZERO,
                        })
                        .collect();
                    for bit in hw_addr.iter_mut().take(hw_wr_wide_log2.min(hw_rd_wide_log2)) {
                        *bit = Net::ZERO;
                    }
                    let hw_addr = Value::from_iter(hw_addr);
                    for cell in &mut cells[rp] {
                        cell.set_port(format!("PORT_{}_ADDR", pname), hw_addr.clone());
                    }

                    if let Some(wp) = wpidx {
                        let wide_log2 = self.mem.write_ports[wp].wide_log2;
                        let port_swz = self.gen_swizzle(cfg, wide_log2, hw_wr_wide_log2);
                        let mut effective_byte = cfg.byte;
                        if effective_byte == 0 || effective_byte > dims.dbits[hw_wr_wide_log2] {
                            effective_byte = dims.dbits[hw_wr_wide_log2];
                        }
                        let big_wren =
                            self.netlist.generate_demux(self.mem, wp, port_swz.addr_shift, &port_swz.addr_mux_bits);
                        for rd in 0..cfg.repl_d {
                            let wport = &self.mem.write_ports[wp];
                            let mut hw_wdata = Value::new();
                            for slot in &port_swz.bits[rd] {
                                match slot {
                                    None => hw_wdata.push(Net::UNDEF),
                                    Some(bit) => hw_wdata.push(wport.data[bit.bit]),
                                }
                            }
                            let mut hw_wren = Value::new();
                            for i in (0..port_swz.bits[rd].len()).step_by(effective_byte) {
                                match &port_swz.bits[rd][i] {
                                    None => hw_wren.push(Net::ZERO),
                                    Some(bit) => hw_wren.push(big_wren[bit.mux_idx][bit.bit]),
                                }
                            }
                            let cell = &mut cells[rp][rd];
                            cell.set_port(format!("PORT_{}_WR_DATA", pname), hw_wdata);
                            cell.set_param(format!("PORT_{}_WR_EN_WIDTH", pname), hw_wren.len());
                            cell.set_port(format!("PORT_{}_WR_EN", pname), hw_wren);
                        }
                    }
                    if let Some(rpidx) = rpidx {
                        let rpcfg = &cfg.rd_ports[rpidx];
                        let wide_log2 = self.mem.read_ports[rpidx].wide_log2;
                        let port_swz = self.gen_swizzle(cfg, wide_log2, hw_rd_wide_log2);
                        let big_rdata =
                            self.netlist.generate_mux(self.mem, rpidx, port_swz.addr_shift, &port_swz.addr_mux_bits);
                        for rd in 0..cfg.repl_d {
                            let (en, arst, srst, ce_over_srst) = {
                                let rport = &self.mem.read_ports[rpidx];
                                (rport.en, rport.arst, rport.srst, rport.ce_over_srst)
                            };
                            let hw_rdata = self.netlist.add_wire(dims.dbits[hw_rd_wide_log2]);
                            let cell = &mut cells[rp][rd];
                            if rpcfg.emit_en {
                                cell.set_port(format!("PORT_{}_RD_EN", pname), Value::from(en));
                            }
                            if arst != Net::ZERO {
                                cell.set_port(format!("PORT_{}_RD_ARST", pname), Value::from(arst));
                                cell.set_param(format!("PORT_{}_RD_ARST_USED", pname), true);
                            }
                            if srst != Net::ZERO {
                                cell.set_port(format!("PORT_{}_RD_SRST", pname), Value::from(srst));
                                cell.set_param(format!("PORT_{}_RD_SRST_USED", pname), true);
                                cell.set_param(format!("PORT_{}_RD_CE_OVER_SRST", pname), ce_over_srst);
                            }
                            for (name, value) in &rpcfg.resetvals {
                                let mut swizzled = Const::new();
                                for slot in &port_swz.bits[rd] {
                                    match slot {
                                        None => swizzled.push(Trit::Undef),
                                        Some(bit) => swizzled.push(value[bit.bit]),
                                    }
                                }
                                cell.set_param(format!("PORT_{}_{}", pname, name), swizzled);
                            }
                            cell.set_port(format!("PORT_{}_RD_DATA", pname), hw_rdata.clone());
                            let mut lhs = Value::new();
                            let mut rhs = Value::new();
                            for (i, slot) in port_swz.bits[rd].iter().enumerate() {
                                if let Some(bit) = slot {
                                    lhs.push(big_rdata[bit.mux_idx][bit.bit]);
                                    rhs.push(hw_rdata[i]);
                                }
                            }
                            self.netlist.connect(&lhs, &rhs);
                        }
                    }
                }
            }
        }

        for row in cells {
            for cell in row {
                self.netlist.add_ram_cell(cell);
            }
        }
    }
}
