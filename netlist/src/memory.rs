use indexmap::IndexMap;

use crate::{Const, Net, Value};

/// An attribute attached to a memory by the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Int(i64),
    String(String),
}

/// A write port of a [`SourceMemory`].
///
/// `data` and `en` are `width << wide_log2` bits.  `addr` is a full-width address whose
/// low `wide_log2` bits are tied to zero.
#[derive(Debug, Clone)]
pub struct MemoryWritePort {
    pub clk_enable: bool,
    pub clk: Net,
    pub clk_polarity: bool,
    pub addr: Value,
    pub data: Value,
    pub en: Value,
    /// `priority_mask[i]` means this port's writes take precedence over write port `i`
    /// on a same-address collision.
    pub priority_mask: Vec<bool>,
    pub wide_log2: usize,
}

/// A read port of a [`SourceMemory`].
///
/// For asynchronous ports `clk_enable` is false and the enable, reset, and initial
/// value fields are inert.
#[derive(Debug, Clone)]
pub struct MemoryReadPort {
    pub clk_enable: bool,
    pub clk: Net,
    pub clk_polarity: bool,
    pub en: Net,
    pub addr: Value,
    pub data: Value,
    pub arst: Net,
    pub arst_value: Const,
    pub srst: Net,
    pub srst_value: Const,
    pub init_value: Const,
    pub ce_over_srst: bool,
    /// `transparency_mask[i]`: a same-address write on port `i` in the same cycle is
    /// observed by this read (new data).
    pub transparency_mask: Vec<bool>,
    /// `collision_x_mask[i]`: a same-address collision with write port `i` may return
    /// anything.
    pub collision_x_mask: Vec<bool>,
    pub wide_log2: usize,
}

/// An abstract memory array extracted from the design, about to be mapped onto target
/// RAM cells.
#[derive(Debug, Clone)]
pub struct SourceMemory {
    pub id: String,
    pub width: usize,
    pub size: usize,
    pub start_offset: i32,
    /// Flattened initial contents, `size * width` trits, row 0 first.
    pub init_data: Const,
    pub attributes: IndexMap<String, AttrValue>,
    pub write_ports: Vec<MemoryWritePort>,
    pub read_ports: Vec<MemoryReadPort>,
}

impl MemoryWritePort {
    pub fn clocked(clk: Net, addr: Value, data: Value, en: Value) -> Self {
        assert_eq!(data.len(), en.len());
        Self {
            clk_enable: true,
            clk,
            clk_polarity: true,
            addr,
            data,
            en,
            priority_mask: vec![],
            wide_log2: 0,
        }
    }
}

impl MemoryReadPort {
    pub fn asynchronous(addr: Value, data: Value) -> Self {
        let width = data.len();
        Self {
            clk_enable: false,
            clk: Net::UNDEF,
            clk_polarity: true,
            en: Net::ONE,
            addr,
            data,
            arst: Net::ZERO,
            arst_value: Const::undef(width),
            srst: Net::ZERO,
            srst_value: Const::undef(width),
            init_value: Const::undef(width),
            ce_over_srst: false,
            transparency_mask: vec![],
            collision_x_mask: vec![],
            wide_log2: 0,
        }
    }

    pub fn clocked(clk: Net, addr: Value, data: Value) -> Self {
        Self { clk_enable: true, clk, ..Self::asynchronous(addr, data) }
    }

    pub fn with_en(self, en: Net) -> Self {
        Self { en, ..self }
    }

    pub fn with_init(self, init_value: Const) -> Self {
        Self { init_value, ..self }
    }

    pub fn with_arst(self, arst: Net, arst_value: Const) -> Self {
        Self { arst, arst_value, ..self }
    }

    pub fn with_srst(self, srst: Net, srst_value: Const) -> Self {
        Self { srst, srst_value, ..self }
    }

    pub fn with_ce_over_srst(self, ce_over_srst: bool) -> Self {
        Self { ce_over_srst, ..self }
    }
}

impl SourceMemory {
    pub fn new(id: impl Into<String>, width: usize, size: usize) -> Self {
        Self {
            id: id.into(),
            width,
            size,
            start_offset: 0,
            init_data: Const::undef(width * size),
            attributes: IndexMap::new(),
            write_ports: vec![],
            read_ports: vec![],
        }
    }

    /// Adds a write port and returns its index.  The collision masks of all ports are
    /// resized to match the new write port count.
    pub fn add_write_port(&mut self, port: MemoryWritePort) -> usize {
        assert_eq!(port.data.len(), self.width << port.wide_log2);
        self.write_ports.push(port);
        let count = self.write_ports.len();
        for port in &mut self.write_ports {
            port.priority_mask.resize(count, false);
        }
        for port in &mut self.read_ports {
            port.transparency_mask.resize(count, false);
            port.collision_x_mask.resize(count, false);
        }
        count - 1
    }

    /// Adds a read port and returns its index.
    pub fn add_read_port(&mut self, port: MemoryReadPort) -> usize {
        assert_eq!(port.data.len(), self.width << port.wide_log2);
        let count = self.write_ports.len();
        self.read_ports.push(port);
        let port = self.read_ports.last_mut().unwrap();
        port.transparency_mask.resize(count, false);
        port.collision_x_mask.resize(count, false);
        self.read_ports.len() - 1
    }

    pub fn get_init_data(&self) -> &Const {
        &self.init_data
    }

    pub fn get_string_attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttrValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_int_attribute(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(AttrValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_bool_attribute(&self, name: &str) -> bool {
        self.get_int_attribute(name) == Some(1)
    }

    /// Whether read-first behavior can be emulated by delaying all writes by half a
    /// cycle: requires a write port, a single clock domain covering every port, and at
    /// least one (read, write) pair that actually reads old data.
    pub fn emulate_read_first_ok(&self) -> bool {
        let Some(first) = self.write_ports.first() else {
            return false;
        };
        let (clk, clk_polarity) = (first.clk, first.clk_polarity);
        for port in &self.write_ports {
            if !port.clk_enable || port.clk != clk || port.clk_polarity != clk_polarity {
                return false;
            }
        }
        let mut found_read_first = false;
        for port in &self.read_ports {
            if !port.clk_enable || port.clk != clk || port.clk_polarity != clk_polarity {
                return false;
            }
            for wpidx in 0..self.write_ports.len() {
                if !port.transparency_mask[wpidx] && !port.collision_x_mask[wpidx] {
                    found_read_first = true;
                }
            }
        }
        found_read_first
    }
}

#[cfg(test)]
mod test {
    use super::{MemoryReadPort, MemoryWritePort, SourceMemory};
    use crate::{Net, Value};

    fn wire(index: usize) -> Net {
        Net::from_wire(index)
    }

    #[test]
    fn test_read_first_ok() {
        let clk = wire(0);
        let mut mem = SourceMemory::new("m", 4, 16);
        assert!(!mem.emulate_read_first_ok());
        mem.add_write_port(MemoryWritePort::clocked(clk, Value::undef(4), Value::undef(4), Value::undef(4)));
        mem.add_read_port(MemoryReadPort::clocked(clk, Value::undef(4), Value::undef(4)));
        assert!(mem.emulate_read_first_ok());
        // transparent pairs don't count as read-first
        mem.read_ports[0].transparency_mask[0] = true;
        assert!(!mem.emulate_read_first_ok());
        mem.read_ports[0].transparency_mask[0] = false;
        mem.read_ports[0].collision_x_mask[0] = true;
        assert!(!mem.emulate_read_first_ok());
        // different clock domains rule it out entirely
        mem.read_ports[0].collision_x_mask[0] = false;
        mem.read_ports[0].clk = wire(1);
        assert!(!mem.emulate_read_first_ok());
    }
}
