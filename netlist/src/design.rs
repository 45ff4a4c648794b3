use crate::{Const, Net, Netlist, RamCell, SourceMemory, Value};

/// One memory emulation step performed through the [`Netlist`] trait, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulationOp {
    ReadFirst,
    ReadDff { port: usize },
    ReadEnable { port: usize },
    CeOverSrst { port: usize },
    SrstOverCe { port: usize },
    Reset { port: usize, init: bool, arst: bool, srst: bool },
    Priority { earlier: usize, later: usize },
    Transparency { write_port: usize, read_port: usize },
}

/// A free-standing implementation of [`Netlist`].
///
/// Signals are opaque wire bits; the sigmaps are identity maps, and the enable
/// implication proofs are structural (anything that isn't obvious from constants and
/// shared nets is reported unprovable).  Every emulation call is recorded in
/// [`Design::emulation_ops`] in addition to updating the memory, so tests can check
/// both what was requested and what the emitter saw afterwards.
#[derive(Debug, Default)]
pub struct Design {
    next_wire: usize,
    pub cells: Vec<RamCell>,
    pub connections: Vec<(Value, Value)>,
    pub inversions: Vec<(Value, Value)>,
    pub emulation_ops: Vec<EmulationOp>,
    pub removed: Vec<SourceMemory>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_wire1(&mut self) -> Net {
        self.add_wire(1)[0]
    }

    fn mux_count(mem: &SourceMemory, addr_shift: usize, addr_mux_bits: &[usize]) -> usize {
        let unit = 1i64 << addr_shift;
        let addr_start = i64::from(mem.start_offset) & !(unit - 1);
        let addr_end = ((i64::from(mem.start_offset) + mem.size as i64 - 1) | (unit - 1)) + 1;
        (((addr_end - addr_start) >> addr_shift) as usize) << addr_mux_bits.len()
    }
}

impl Netlist for Design {
    fn sigmap(&self, value: &Value) -> Value {
        value.clone()
    }

    fn sigmap_xmux(&self, value: &Value) -> Value {
        value.clone()
    }

    fn write_implies_read(&mut self, mem: &SourceMemory, wpidx: usize, rpidx: usize) -> bool {
        let rd_en = mem.read_ports[rpidx].en;
        if rd_en == Net::ONE {
            return true;
        }
        let wr_en = &mem.write_ports[wpidx].en;
        if wr_en.is_zero() {
            return true;
        }
        wr_en.iter().all(|net| net == Net::ZERO || net == rd_en)
    }

    fn write_excludes_read(&mut self, mem: &SourceMemory, wpidx: usize, rpidx: usize) -> bool {
        mem.read_ports[rpidx].en == Net::ZERO || mem.write_ports[wpidx].en.is_zero()
    }

    fn emulate_read_first(&mut self, mem: &mut SourceMemory) {
        self.emulation_ops.push(EmulationOp::ReadFirst);
        // writes move to the opposite clock edge
        for port in &mut mem.write_ports {
            port.clk_polarity = !port.clk_polarity;
        }
    }

    fn extract_read_dff(&mut self, mem: &mut SourceMemory, pidx: usize) {
        self.emulation_ops.push(EmulationOp::ReadDff { port: pidx });
        let port = &mut mem.read_ports[pidx];
        let width = port.data.len();
        port.clk_enable = false;
        port.clk = Net::UNDEF;
        port.en = Net::ONE;
        port.arst = Net::ZERO;
        port.srst = Net::ZERO;
        port.arst_value = Const::undef(width);
        port.srst_value = Const::undef(width);
        port.init_value = Const::undef(width);
        port.ce_over_srst = false;
        port.transparency_mask.fill(false);
        port.collision_x_mask.fill(false);
    }

    fn emulate_read_enable(&mut self, mem: &mut SourceMemory, pidx: usize) {
        self.emulation_ops.push(EmulationOp::ReadEnable { port: pidx });
        let port = &mut mem.read_ports[pidx];
        let width = port.data.len();
        port.en = Net::ONE;
        port.arst = Net::ZERO;
        port.srst = Net::ZERO;
        port.arst_value = Const::undef(width);
        port.srst_value = Const::undef(width);
        port.init_value = Const::undef(width);
    }

    fn emulate_read_ce_over_srst(&mut self, mem: &mut SourceMemory, pidx: usize) {
        self.emulation_ops.push(EmulationOp::CeOverSrst { port: pidx });
        mem.read_ports[pidx].ce_over_srst = false;
    }

    fn emulate_read_srst_over_ce(&mut self, mem: &mut SourceMemory, pidx: usize) {
        self.emulation_ops.push(EmulationOp::SrstOverCe { port: pidx });
        mem.read_ports[pidx].ce_over_srst = true;
    }

    fn emulate_reset(&mut self, mem: &mut SourceMemory, pidx: usize, init: bool, arst: bool, srst: bool) {
        if !init && !arst && !srst {
            return;
        }
        self.emulation_ops.push(EmulationOp::Reset { port: pidx, init, arst, srst });
        let port = &mut mem.read_ports[pidx];
        let width = port.data.len();
        if init {
            port.init_value = Const::undef(width);
        }
        if arst {
            port.arst = Net::ZERO;
            port.arst_value = Const::undef(width);
        }
        if srst {
            port.srst = Net::ZERO;
            port.srst_value = Const::undef(width);
        }
    }

    fn emulate_priority(&mut self, mem: &mut SourceMemory, earlier: usize, later: usize) {
        self.emulation_ops.push(EmulationOp::Priority { earlier, later });
        mem.write_ports[later].priority_mask[earlier] = false;
    }

    fn emulate_transparency(&mut self, mem: &mut SourceMemory, wpidx: usize, rpidx: usize) {
        self.emulation_ops.push(EmulationOp::Transparency { write_port: wpidx, read_port: rpidx });
        let port = &mut mem.read_ports[rpidx];
        port.transparency_mask[wpidx] = false;
        port.collision_x_mask[wpidx] = true;
    }

    fn generate_demux(
        &mut self,
        mem: &SourceMemory,
        wpidx: usize,
        addr_shift: usize,
        addr_mux_bits: &[usize],
    ) -> Vec<Value> {
        let width = mem.write_ports[wpidx].en.len();
        (0..Self::mux_count(mem, addr_shift, addr_mux_bits)).map(|_| self.add_wire(width)).collect()
    }

    fn generate_mux(
        &mut self,
        mem: &SourceMemory,
        rpidx: usize,
        addr_shift: usize,
        addr_mux_bits: &[usize],
    ) -> Vec<Value> {
        let width = mem.read_ports[rpidx].data.len();
        (0..Self::mux_count(mem, addr_shift, addr_mux_bits)).map(|_| self.add_wire(width)).collect()
    }

    fn add_wire(&mut self, width: usize) -> Value {
        let value = Value::from_iter((self.next_wire..self.next_wire + width).map(Net::from_wire));
        self.next_wire += width;
        value
    }

    fn add_not(&mut self, value: &Value) -> Value {
        let output = self.add_wire(value.len());
        self.inversions.push((value.clone(), output.clone()));
        output
    }

    fn connect(&mut self, lhs: &Value, rhs: &Value) {
        assert_eq!(lhs.len(), rhs.len());
        self.connections.push((lhs.clone(), rhs.clone()));
    }

    fn add_ram_cell(&mut self, cell: RamCell) {
        self.cells.push(cell);
    }

    fn remove_memory(&mut self, mem: SourceMemory) {
        self.removed.push(mem);
    }
}

#[cfg(test)]
mod test {
    use super::Design;
    use crate::{MemoryReadPort, MemoryWritePort, Net, Netlist, SourceMemory, Value};

    fn one_port_mem(design: &mut Design, wr_en: Value, rd_en: Net) -> SourceMemory {
        let clk = design.add_wire1();
        let mut mem = SourceMemory::new("m", wr_en.len(), 16);
        let width = wr_en.len();
        let (addr, data) = (design.add_wire(4), design.add_wire(width));
        mem.add_write_port(MemoryWritePort::clocked(clk, addr.clone(), data, wr_en));
        let data = design.add_wire(width);
        mem.add_read_port(MemoryReadPort::clocked(clk, addr, data).with_en(rd_en));
        mem
    }

    #[test]
    fn test_structural_proofs() {
        let mut design = Design::new();
        let en = design.add_wire1();
        let mem = one_port_mem(&mut design, Value::from(en), Net::ONE);
        assert!(design.write_implies_read(&mem, 0, 0));
        assert!(!design.write_excludes_read(&mem, 0, 0));

        let mut design = Design::new();
        let en = design.add_wire1();
        let mem = one_port_mem(&mut design, Value::from(en), en);
        assert!(design.write_implies_read(&mem, 0, 0));

        let mut design = Design::new();
        let en = design.add_wire1();
        let other = design.add_wire1();
        let mem = one_port_mem(&mut design, Value::from(en), other);
        assert!(!design.write_implies_read(&mem, 0, 0));
        assert!(!design.write_excludes_read(&mem, 0, 0));

        let mut design = Design::new();
        let mem = one_port_mem(&mut design, Value::zero(1), Net::ZERO);
        assert!(design.write_implies_read(&mem, 0, 0));
        assert!(design.write_excludes_read(&mem, 0, 0));
    }

    #[test]
    fn test_demux_count() {
        let mut design = Design::new();
        let mut mem = SourceMemory::new("m", 1, 24);
        let (clk, addr, data, en) = (design.add_wire1(), design.add_wire(5), design.add_wire(1), design.add_wire(1));
        mem.add_write_port(MemoryWritePort::clocked(clk, addr, data, en));
        // 24 rows over a 16-row hardware array: two hardware passes, one mux bit
        assert_eq!(design.generate_demux(&mem, 0, 4, &[4]).len(), 4);
        assert_eq!(design.generate_demux(&mem, 0, 5, &[]).len(), 1);
    }
}
