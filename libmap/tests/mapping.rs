use std::collections::BTreeSet;

use ramforge_libmap::library::{LibOptions, Library};
use ramforge_libmap::{lower_memories, parse_library, MapError};
use ramforge_netlist::{
    AttrValue, Const, Design, EmulationOp, MemoryReadPort, MemoryWritePort, Net, Netlist, ParamValue, SourceMemory,
    Trit, Value,
};

fn library(source: &str) -> Library {
    let mut lib = Library::new(LibOptions::default(), BTreeSet::new());
    parse_library(&mut lib, "test.lib", source).unwrap();
    lib
}

fn repeat_net(net: Net, width: usize) -> Value {
    Value::from_iter(std::iter::repeat_n(net, width))
}

#[test]
fn test_rom_single_port() {
    let lib = library(concat!(
        "ram distributed $lutrom {\n",
        "    abits 8 dbits 1 2 4 8 tied cost 1;\n",
        "    init any;\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let addr = design.add_wire(5);
    let data = design.add_wire(8);
    let mut mem = SourceMemory::new("rom", 8, 32);
    let init = Const::from_iter((0..256).map(|index| match index % 3 {
        0 => Trit::One,
        1 => Trit::Zero,
        _ => Trit::Undef,
    }));
    mem.init_data = init.clone();
    mem.add_read_port(MemoryReadPort::clocked(clk, addr.clone(), data));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert!(design.emulation_ops.is_empty());
    assert_eq!(design.removed.len(), 1);
    assert_eq!(design.cells.len(), 1);
    let cell = &design.cells[0];
    assert_eq!(cell.name, "rom.0.0");
    assert_eq!(cell.kind, "$lutrom");
    assert_eq!(cell.get_param("ABITS"), Some(&ParamValue::Int(8)));
    assert_eq!(cell.get_param("BYTE"), Some(&ParamValue::Int(0)));
    assert_eq!(cell.get_param("WIDTH"), Some(&ParamValue::Int(8)));
    // the whole ROM fits one cell, so INIT carries the contents verbatim
    assert_eq!(cell.get_param("INIT"), Some(&ParamValue::Const(init)));
    assert_eq!(cell.get_param("PORT_R_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_R_CLKPOL"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_port("PORT_R_CLK"), Some(&Value::from(clk)));
    assert_eq!(cell.get_port("PORT_R_RD_EN"), Some(&Value::from(Net::ONE)));
    let hw_addr = cell.get_port("PORT_R_ADDR").unwrap();
    assert_eq!(hw_addr.len(), 8);
    assert_eq!(hw_addr.slice(..3), Value::zero(3));
    assert_eq!(hw_addr.slice(3..), addr);
}

#[test]
fn test_dual_port_bram_transparent() {
    let lib = library(concat!(
        "ram block $bram {\n",
        "    abits 12 dbits 8 16 32 tied cost 50;\n",
        "    port srsw \"A\" \"B\" {\n",
        "        clock anyedge \"CLK\";\n",
        "        rden any;\n",
        "        wrtrans other new;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let we = design.add_wire1();
    let waddr = design.add_wire(10);
    let wdata = design.add_wire(32);
    let raddr = design.add_wire(10);
    let rdata = design.add_wire(32);
    let mut mem = SourceMemory::new("m", 32, 1024);
    mem.add_write_port(MemoryWritePort::clocked(clk, waddr.clone(), wdata.clone(), repeat_net(we, 32)));
    let rp = mem.add_read_port(MemoryReadPort::clocked(clk, raddr.clone(), rdata));
    mem.read_ports[rp].transparency_mask[0] = true;

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    // the new-data capability covers the transparent pair, no soft logic at all
    assert!(design.emulation_ops.is_empty());
    assert_eq!(design.cells.len(), 1);
    let cell = &design.cells[0];
    assert_eq!(cell.get_param("WIDTH"), Some(&ParamValue::Int(32)));
    assert_eq!(cell.get_param("CLKPOL_CLK"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_port("CLK_CLK"), Some(&Value::from(clk)));
    assert_eq!(cell.get_param("PORT_A_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_A_WR_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_A_RD_USED"), Some(&ParamValue::Bool(false)));
    assert_eq!(cell.get_param("PORT_B_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_B_WR_USED"), Some(&ParamValue::Bool(false)));
    assert_eq!(cell.get_param("PORT_B_RD_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_port("PORT_A_WR_DATA"), Some(&wdata));
    assert_eq!(cell.get_param("PORT_A_WR_EN_WIDTH"), Some(&ParamValue::Int(1)));
    assert_eq!(cell.get_port("PORT_A_WR_EN").unwrap().len(), 1);
    assert_eq!(cell.get_port("PORT_B_RD_DATA").unwrap().len(), 32);
    assert_eq!(design.connections.len(), 1);
    assert_eq!(design.connections[0].0.len(), 32);
}

#[test]
fn test_rden_none_emulation() {
    let lib = library(concat!(
        "ram block $bram {\n",
        "    abits 6 dbits 4 tied cost 1;\n",
        "    port sw \"W\" {\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden none;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let wclk = design.add_wire1();
    let rclk = design.add_wire1();
    let ren = design.add_wire1();
    let waddr = design.add_wire(4);
    let wdata = design.add_wire(4);
    let we = design.add_wire1();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.add_write_port(MemoryWritePort::clocked(wclk, waddr, wdata, repeat_net(we, 4)));
    mem.add_read_port(MemoryReadPort::clocked(rclk, raddr, rdata).with_en(ren));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert_eq!(design.emulation_ops, vec![EmulationOp::ReadEnable { port: 0 }]);
    assert_eq!(design.cells.len(), 1);
    // the hardware port has no enable input to drive
    assert_eq!(design.cells[0].get_port("PORT_R_RD_EN"), None);
}

#[test]
fn test_priority_emulation() {
    let lib = library(concat!(
        "ram distributed $lutram {\n",
        "    abits 5 dbits 4 cost 1;\n",
        "    port sw \"W\" \"X\" {\n",
        "    }\n",
        "    port ar \"R\" {\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let mut mem = SourceMemory::new("m", 4, 16);
    for _ in 0..2 {
        let addr = design.add_wire(4);
        let data = design.add_wire(4);
        let we = design.add_wire1();
        mem.add_write_port(MemoryWritePort::clocked(clk, addr, data, repeat_net(we, 4)));
    }
    mem.write_ports[1].priority_mask[0] = true;
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    mem.add_read_port(MemoryReadPort::asynchronous(raddr, rdata));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert_eq!(design.emulation_ops, vec![EmulationOp::Priority { earlier: 0, later: 1 }]);
    assert!(!design.removed[0].write_ports[1].priority_mask[0]);
    assert_eq!(design.cells.len(), 1);
    let cell = &design.cells[0];
    for name in ["PORT_W_USED", "PORT_X_USED", "PORT_R_USED"] {
        assert_eq!(cell.get_param(name), Some(&ParamValue::Bool(true)));
    }
}

#[test]
fn test_kind_override_unsatisfiable() {
    let lib = library(concat!(
        "ram distributed $lutram {\n",
        "    abits 5 dbits 4 cost 1;\n",
        "    port ar \"R\" {\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.attributes.insert("ram_style".into(), AttrValue::String("block".into()));
    mem.add_read_port(MemoryReadPort::asynchronous(raddr, rdata));

    let error = lower_memories(&mut design, &lib, vec![mem]).unwrap_err();
    assert!(matches!(error, MapError::NoRams { .. }));
    assert_eq!(error.to_string(), "m: no available block RAMs");
    assert!(design.cells.is_empty());
}

#[test]
fn test_style_unsatisfiable() {
    let lib = library(concat!(
        "ram distributed $lutram {\n",
        "    abits 5 dbits 4 cost 1;\n",
        "    port ar \"R\" {\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.attributes.insert("ram_style".into(), AttrValue::String("foo".into()));
    mem.add_read_port(MemoryReadPort::asynchronous(raddr, rdata));

    let error = lower_memories(&mut design, &lib, vec![mem]).unwrap_err();
    assert_eq!(error.to_string(), "m: no available RAMs with style \"foo\"");
}

#[test]
fn test_style_selects_ram() {
    let lib = library(concat!(
        "ram distributed $lutram {\n",
        "    abits 5 dbits 4 cost 1;\n",
        "    style \"distram\";\n",
        "    port ar \"R\" {\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.attributes.insert("ram_style".into(), AttrValue::String("distram".into()));
    mem.add_read_port(MemoryReadPort::asynchronous(raddr, rdata));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert_eq!(design.cells.len(), 1);
    assert_eq!(design.cells[0].kind, "$lutram");
}

#[test]
fn test_shared_port() {
    let lib = library(concat!(
        "ram block $dpram {\n",
        "    abits 6 dbits 8 tied cost 10;\n",
        "    port srsw \"A\" {\n",
        "        rden any;\n",
        "        wrtrans self new;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let addr = design.add_wire(3);
    let wdata = design.add_wire(8);
    let rdata = design.add_wire(8);
    let we = design.add_wire1();
    let mut mem = SourceMemory::new("m", 8, 8);
    mem.add_write_port(MemoryWritePort::clocked(clk, addr.clone(), wdata.clone(), repeat_net(we, 8)));
    let rp = mem.add_read_port(MemoryReadPort::clocked(clk, addr.clone(), rdata));
    mem.read_ports[rp].transparency_mask[0] = true;

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert!(design.emulation_ops.is_empty());
    assert_eq!(design.cells.len(), 1);
    let cell = &design.cells[0];
    assert_eq!(cell.get_param("PORT_A_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_A_WR_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_A_RD_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_port("PORT_A_WR_DATA"), Some(&wdata));
    assert_eq!(cell.get_port("PORT_A_RD_EN"), Some(&Value::from(Net::ONE)));
}

#[test]
fn test_write_implies_proven() {
    let lib = library(concat!(
        "ram block $dpram {\n",
        "    abits 6 dbits 8 tied cost 10;\n",
        "    port srsw \"A\" {\n",
        "        rden write-implies;\n",
        "        wrtrans self old;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let addr = design.add_wire(3);
    let wdata = design.add_wire(8);
    let rdata = design.add_wire(8);
    let we = design.add_wire1();
    let mut mem = SourceMemory::new("m", 8, 8);
    mem.add_write_port(MemoryWritePort::clocked(clk, addr.clone(), wdata, repeat_net(we, 8)));
    // read enable constant one: the implication trivially holds
    mem.add_read_port(MemoryReadPort::clocked(clk, addr.clone(), rdata));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert!(design.emulation_ops.is_empty());
    assert_eq!(design.cells.len(), 1);
    assert_eq!(design.cells[0].get_port("PORT_A_RD_EN"), Some(&Value::from(Net::ONE)));
}

#[test]
fn test_write_implies_unprovable() {
    let lib = library(concat!(
        "ram block $dpram {\n",
        "    abits 6 dbits 8 tied cost 10;\n",
        "    port srsw \"A\" {\n",
        "        rden write-implies;\n",
        "        wrtrans self old;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let addr = design.add_wire(3);
    let wdata = design.add_wire(8);
    let rdata = design.add_wire(8);
    let we = design.add_wire1();
    let ren = design.add_wire1();
    let mut mem = SourceMemory::new("m", 8, 8);
    mem.add_write_port(MemoryWritePort::clocked(clk, addr.clone(), wdata, repeat_net(we, 8)));
    mem.add_read_port(MemoryReadPort::clocked(clk, addr.clone(), rdata).with_en(ren));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    // unrelated enables: the implication cannot be shown, so the enable is emulated
    assert_eq!(design.emulation_ops, vec![EmulationOp::ReadEnable { port: 0 }]);
    assert_eq!(design.cells[0].get_port("PORT_A_RD_EN"), Some(&Value::from(Net::ONE)));
}

#[test]
fn test_write_excludes_rejected() {
    let lib = library(concat!(
        "ram block $dpram {\n",
        "    abits 6 dbits 8 tied cost 10;\n",
        "    port srsw \"A\" {\n",
        "        rden write-excludes;\n",
        "        wrtrans self old;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let addr = design.add_wire(3);
    let wdata = design.add_wire(8);
    let rdata = design.add_wire(8);
    let we = design.add_wire1();
    let ren = design.add_wire1();
    let mut mem = SourceMemory::new("m", 8, 8);
    mem.add_write_port(MemoryWritePort::clocked(clk, addr.clone(), wdata, repeat_net(we, 8)));
    mem.add_read_port(MemoryReadPort::clocked(clk, addr.clone(), rdata).with_en(ren));

    // the exclusion cannot be shown either, which kills the only candidate; the
    // memory stays behind for register mapping
    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert_eq!(leftover.len(), 1);
    assert!(design.cells.is_empty());
}

#[test]
fn test_soft_transparency() {
    let lib = library(concat!(
        "ram block $dpram {\n",
        "    abits 6 dbits 8 tied cost 10;\n",
        "    port srsw \"A\" {\n",
        "        rden any;\n",
        "        wrtrans self old;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let addr = design.add_wire(3);
    let wdata = design.add_wire(8);
    let rdata = design.add_wire(8);
    let we = design.add_wire1();
    let mut mem = SourceMemory::new("m", 8, 8);
    mem.add_write_port(MemoryWritePort::clocked(clk, addr.clone(), wdata, repeat_net(we, 8)));
    let rp = mem.add_read_port(MemoryReadPort::clocked(clk, addr.clone(), rdata));
    mem.read_ports[rp].transparency_mask[0] = true;

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    // old-data hardware, transparent source: a soft bypass is patched in
    assert_eq!(design.emulation_ops, vec![EmulationOp::Transparency { write_port: 0, read_port: 0 }]);
    assert_eq!(design.cells.len(), 1);
}

#[test]
fn test_read_first_emulation() {
    let lib = library(concat!(
        "ram block $bram {\n",
        "    abits 6 dbits 8 tied cost 10;\n",
        "    port sw \"W\" {\n",
        "        wrtrans other new;\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk = design.add_wire1();
    let waddr = design.add_wire(3);
    let wdata = design.add_wire(8);
    let we = design.add_wire1();
    let raddr = design.add_wire(3);
    let rdata = design.add_wire(8);
    let mut mem = SourceMemory::new("m", 8, 8);
    mem.add_write_port(MemoryWritePort::clocked(clk, waddr, wdata, repeat_net(we, 8)));
    // same clock domain, and the pair reads old data
    mem.add_read_port(MemoryReadPort::clocked(clk, raddr, rdata));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    // the only new-data capability is usable after read-first emulation
    assert_eq!(design.emulation_ops, vec![EmulationOp::ReadFirst]);
    assert_eq!(design.cells.len(), 1);
    let cell = &design.cells[0];
    // the write moved to the opposite clock edge
    assert_eq!(cell.get_param("PORT_W_CLKPOL"), Some(&ParamValue::Bool(false)));
    assert_eq!(cell.get_param("PORT_R_CLKPOL"), Some(&ParamValue::Bool(true)));
}

#[test]
fn test_named_reset_value() {
    let lib = library(concat!(
        "ram block $bram {\n",
        "    abits 6 dbits 4 tied cost 1;\n",
        "    port sw \"W\" {\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "        rdarstval \"RSTVAL\";\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let wclk = design.add_wire1();
    let rclk = design.add_wire1();
    let arst = design.add_wire1();
    let waddr = design.add_wire(4);
    let wdata = design.add_wire(4);
    let we = design.add_wire1();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.add_write_port(MemoryWritePort::clocked(wclk, waddr, wdata, repeat_net(we, 4)));
    mem.add_read_port(MemoryReadPort::clocked(rclk, raddr, rdata).with_arst(arst, Const::lit("1010")));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert!(design.emulation_ops.is_empty());
    let cell = &design.cells[0];
    assert_eq!(cell.get_port("PORT_R_RD_ARST"), Some(&Value::from(arst)));
    assert_eq!(cell.get_param("PORT_R_RD_ARST_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_R_RSTVAL"), Some(&ParamValue::Const(Const::lit("1010"))));
}

#[test]
fn test_srst_zero_value() {
    let source = concat!(
        "ram block $bram {\n",
        "    abits 6 dbits 4 tied cost 1;\n",
        "    port sw \"W\" {\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "        rdsrstval zero;\n",
        "    }\n",
        "}\n",
    );

    // an all-zero reset value fits the hardware
    let lib = library(source);
    let mut design = Design::new();
    let wclk = design.add_wire1();
    let rclk = design.add_wire1();
    let srst = design.add_wire1();
    let waddr = design.add_wire(4);
    let wdata = design.add_wire(4);
    let we = design.add_wire1();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.add_write_port(MemoryWritePort::clocked(wclk, waddr, wdata, repeat_net(we, 4)));
    mem.add_read_port(MemoryReadPort::clocked(rclk, raddr, rdata).with_srst(srst, Const::zero(4)));
    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert!(design.emulation_ops.is_empty());
    let cell = &design.cells[0];
    assert_eq!(cell.get_port("PORT_R_RD_SRST"), Some(&Value::from(srst)));
    assert_eq!(cell.get_param("PORT_R_RD_SRST_USED"), Some(&ParamValue::Bool(true)));
    assert_eq!(cell.get_param("PORT_R_RD_CE_OVER_SRST"), Some(&ParamValue::Bool(false)));

    // a nonzero value does not, and gets emulated instead
    let lib = library(source);
    let mut design = Design::new();
    let wclk = design.add_wire1();
    let rclk = design.add_wire1();
    let srst = design.add_wire1();
    let waddr = design.add_wire(4);
    let wdata = design.add_wire(4);
    let we = design.add_wire1();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.add_write_port(MemoryWritePort::clocked(wclk, waddr, wdata, repeat_net(we, 4)));
    mem.add_read_port(MemoryReadPort::clocked(rclk, raddr, rdata).with_srst(srst, Const::lit("0101")));
    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert_eq!(design.emulation_ops, vec![EmulationOp::Reset { port: 0, init: false, arst: false, srst: true }]);
    // the reset was absorbed into soft logic, nothing to wire up
    assert_eq!(design.cells[0].get_port("PORT_R_RD_SRST"), None);
}

#[test]
fn test_logic_fallback_cheaper() {
    let lib = library(concat!(
        "ram block $bram {\n",
        "    abits 10 dbits 8 tied cost 100;\n",
        "    port sw \"W\" {\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let wclk = design.add_wire1();
    let rclk = design.add_wire1();
    let waddr = design.add_wire(1);
    let wdata = design.add_wire(8);
    let we = design.add_wire1();
    let raddr = design.add_wire(1);
    let rdata = design.add_wire(8);
    let mut mem = SourceMemory::new("tiny", 8, 2);
    mem.add_write_port(MemoryWritePort::clocked(wclk, waddr, wdata, repeat_net(we, 8)));
    mem.add_read_port(MemoryReadPort::clocked(rclk, raddr, rdata));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert_eq!(leftover.len(), 1);
    assert_eq!(leftover[0].id, "tiny");
    assert!(design.cells.is_empty());
}

#[test]
fn test_logic_attribute() {
    let lib = library(concat!(
        "ram distributed $lutram {\n",
        "    abits 5 dbits 4 cost 1;\n",
        "    port ar \"R\" {\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.attributes.insert("ram_style".into(), AttrValue::String("logic".into()));
    mem.add_read_port(MemoryReadPort::asynchronous(raddr, rdata));

    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert_eq!(leftover.len(), 1);
    assert!(design.cells.is_empty());
}

#[test]
fn test_no_auto_kind() {
    let source = concat!(
        "ram block $bram {\n",
        "    abits 6 dbits 4 tied cost 1;\n",
        "    port sw \"W\" {\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "    }\n",
        "}\n",
    );
    let mut lib = Library::new(LibOptions { no_auto_block: true, ..LibOptions::default() }, BTreeSet::new());
    parse_library(&mut lib, "test.lib", source).unwrap();

    let mut design = Design::new();
    let wclk = design.add_wire1();
    let rclk = design.add_wire1();
    let waddr = design.add_wire(4);
    let wdata = design.add_wire(4);
    let we = design.add_wire1();
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    let mut mem = SourceMemory::new("m", 4, 16);
    mem.add_write_port(MemoryWritePort::clocked(wclk, waddr.clone(), wdata.clone(), repeat_net(we, 4)));
    mem.add_read_port(MemoryReadPort::clocked(rclk, raddr.clone(), rdata.clone()));

    // automatic selection is disabled, the memory falls back to registers
    let leftover = lower_memories(&mut design, &lib, vec![mem.clone()]).unwrap();
    assert_eq!(leftover.len(), 1);
    assert!(design.cells.is_empty());

    // an explicit attribute overrides the restriction
    mem.attributes.insert("ram_style".into(), AttrValue::String("block".into()));
    let leftover = lower_memories(&mut design, &lib, vec![mem]).unwrap();
    assert!(leftover.is_empty());
    assert_eq!(design.cells.len(), 1);
}

#[test]
fn test_unmappable_memory() {
    let lib = library(concat!(
        "ram block $bram {\n",
        "    abits 6 dbits 4 tied cost 1;\n",
        "    port sw \"W\" {\n",
        "    }\n",
        "    port sr \"R\" {\n",
        "        rden any;\n",
        "    }\n",
        "}\n",
    ));
    let mut design = Design::new();
    let clk_a = design.add_wire1();
    let clk_b = design.add_wire1();
    let mut mem = SourceMemory::new("m", 4, 16);
    for clk in [clk_a, clk_b] {
        let addr = design.add_wire(4);
        let data = design.add_wire(4);
        let we = design.add_wire1();
        mem.add_write_port(MemoryWritePort::clocked(clk, addr, data, repeat_net(we, 4)));
    }
    let raddr = design.add_wire(4);
    let rdata = design.add_wire(4);
    mem.add_read_port(MemoryReadPort::clocked(clk_a, raddr, rdata));

    // two write ports in different clock domains: one hardware write port is not
    // enough, and registers cannot span two domains either
    let error = lower_memories(&mut design, &lib, vec![mem]).unwrap_err();
    assert!(matches!(error, MapError::NoMapping { .. }));
    assert_eq!(error.to_string(), "no valid mapping found for memory m");
}
