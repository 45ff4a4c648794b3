//! Parser for the textual RAM library format.
//!
//! The format is line-oriented: `#` starts a comment, statements end with `;`, and a
//! statement body is either a single item or a `{ … }` block.  `ifdef`/`ifndef` test
//! the define set the library was constructed with, and `option`/`portoption` open
//! lexical scopes whose bindings qualify every capability declared inside them.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt::Display;

use crate::library::{
    Capability, ClkPolKind, ClockDef, Library, MemoryDimsDef, MemoryInitKind, OptValue, PortGroupDef, PortKind,
    RamDef, RamKind, RdEnKind, ResetKind, ResetValDef, ResetValKind, SrstKind, TransKind, TransTarget, WidthDef,
    WrTransDef,
};

/// A syntax or semantic error in a library file, with its location.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

impl Error for ParseError {}

/// Parses one library file into `lib`.  `filename` is only used for diagnostics; the
/// caller is responsible for file IO.
pub fn parse_library(lib: &mut Library, filename: &str, source: &str) -> Result<(), ParseError> {
    let mut parser = Parser {
        filename,
        lines: source.lines(),
        line_number: 0,
        tokens: VecDeque::new(),
        eof: false,
        lib,
        option_stack: vec![],
        portoption_stack: vec![],
        ram: RamDef::default(),
        port: PortGroupDef::default(),
        active: true,
    };
    while !parser.peek_token().is_empty() {
        parser.parse_top_item()?;
    }
    Ok(())
}

struct Parser<'a> {
    filename: &'a str,
    lines: std::str::Lines<'a>,
    line_number: usize,
    tokens: VecDeque<String>,
    eof: bool,
    lib: &'a mut Library,
    option_stack: Vec<(String, OptValue)>,
    portoption_stack: Vec<(String, OptValue)>,
    ram: RamDef,
    port: PortGroupDef,
    active: bool,
}

fn parse_c_int(token: &str) -> Option<i64> {
    let (sign, digits) = match token.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, token),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(sign * value)
}

impl<'a> Parser<'a> {
    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        self.error_at(self.line_number, message)
    }

    fn error_at<T>(&self, line: usize, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError { file: self.filename.to_owned(), line, message: message.into() })
    }

    fn refill(&mut self) {
        while self.tokens.is_empty() && !self.eof {
            let Some(line) = self.lines.next() else {
                self.eof = true;
                break;
            };
            self.line_number += 1;
            for token in line.split_whitespace() {
                if token.starts_with('#') {
                    break;
                }
                if let Some(stripped) = token.strip_suffix(';') {
                    if !stripped.is_empty() {
                        self.tokens.push_back(stripped.to_owned());
                    }
                    self.tokens.push_back(";".to_owned());
                } else {
                    self.tokens.push_back(token.to_owned());
                }
            }
        }
    }

    /// Returns the next token, or the empty string at end of file.
    fn get_token(&mut self) -> String {
        self.refill();
        self.tokens.pop_front().unwrap_or_default()
    }

    fn peek_token(&mut self) -> String {
        self.refill();
        self.tokens.front().cloned().unwrap_or_default()
    }

    fn eat_token(&mut self, expected: &str) -> Result<(), ParseError> {
        let token = self.get_token();
        if token != expected {
            return self.error(format!("expected `{}`, got `{}`.", expected, token));
        }
        Ok(())
    }

    fn get_id(&mut self) -> Result<String, ParseError> {
        let token = self.get_token();
        if !token.starts_with('$') && !token.starts_with('\\') {
            return self.error(format!("expected id string, got `{}`.", token));
        }
        Ok(token)
    }

    fn get_name(&mut self) -> Result<String, ParseError> {
        let token = self.get_token();
        let mut chars = token.chars();
        let valid = match chars.next() {
            Some(first) => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            None => false,
        };
        if !valid {
            return self.error(format!("expected name, got `{}`.", token));
        }
        Ok(token)
    }

    fn get_string(&mut self) -> Result<String, ParseError> {
        let token = self.get_token();
        if token.len() < 2 || !token.starts_with('"') || !token.ends_with('"') {
            return self.error(format!("expected string, got `{}`.", token));
        }
        Ok(token[1..token.len() - 1].to_owned())
    }

    fn peek_string(&mut self) -> bool {
        self.peek_token().starts_with('"')
    }

    fn get_int(&mut self) -> Result<i64, ParseError> {
        let token = self.get_token();
        match parse_c_int(&token) {
            Some(value) => Ok(value),
            None => self.error(format!("expected int, got `{}`.", token)),
        }
    }

    fn get_positive_int(&mut self, what: &str) -> Result<usize, ParseError> {
        let value = self.get_int()?;
        if value <= 0 {
            return self.error(format!("{} {} not positive.", what, value));
        }
        Ok(value as usize)
    }

    fn get_double(&mut self) -> Result<f64, ParseError> {
        let token = self.get_token();
        match token.parse::<f64>() {
            Ok(value) => Ok(value),
            Err(_) => self.error(format!("expected float, got `{}`.", token)),
        }
    }

    fn peek_int(&mut self) -> bool {
        self.peek_token().chars().next().is_some_and(|c| c.is_ascii_digit())
    }

    fn get_semi(&mut self) -> Result<(), ParseError> {
        let token = self.get_token();
        if token != ";" {
            return self.error(format!("expected `;`, got `{}`.", token));
        }
        Ok(())
    }

    fn get_value(&mut self) -> Result<OptValue, ParseError> {
        if self.peek_string() {
            Ok(OptValue::String(self.get_string()?))
        } else {
            Ok(OptValue::Int(self.get_int()?))
        }
    }

    /// Enters an `ifdef`/`ifndef` branch, returning the saved activity flag.  An
    /// inactive enclosing branch keeps the inner one inactive no matter what the
    /// define set says.
    fn enter_ifdef(&mut self, polarity: bool) -> Result<bool, ParseError> {
        let save = self.active;
        let name = self.get_name()?;
        self.lib.defines_unused.remove(&name);
        self.active = save && (self.lib.defines.contains(&name) == polarity);
        Ok(save)
    }

    fn enter_else(&mut self, save: bool) {
        self.get_token();
        self.active = !self.active && save;
    }

    fn enter_option(&mut self) -> Result<(), ParseError> {
        let name = self.get_string()?;
        let value = self.get_value()?;
        self.option_stack.push((name, value));
        Ok(())
    }

    fn enter_portoption(&mut self) -> Result<(), ParseError> {
        let name = self.get_string()?;
        let value = self.get_value()?;
        self.portoption_stack.push((name, value));
        Ok(())
    }

    /// Snapshots the current option scopes into a capability.
    fn cap<T>(&self, val: T) -> Capability<T> {
        Capability {
            val,
            opts: self.option_stack.iter().cloned().collect(),
            portopts: self.portoption_stack.iter().cloned().collect(),
        }
    }

    fn parse_block(&mut self, item: fn(&mut Self) -> Result<(), ParseError>) -> Result<(), ParseError> {
        if self.peek_token() == "{" {
            self.get_token();
            while self.peek_token() != "}" {
                item(self)?;
            }
            self.get_token();
        } else {
            item(self)?;
        }
        Ok(())
    }

    fn parse_conditional(
        &mut self,
        polarity: bool,
        item: fn(&mut Self) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        let save = self.enter_ifdef(polarity)?;
        self.parse_block(item)?;
        if self.peek_token() == "else" {
            self.enter_else(save);
            self.parse_block(item)?;
        }
        self.active = save;
        Ok(())
    }

    fn parse_port_item(&mut self) -> Result<(), ParseError> {
        let token = self.get_token();
        match token.as_str() {
            "ifdef" => self.parse_conditional(true, Self::parse_port_item)?,
            "ifndef" => self.parse_conditional(false, Self::parse_port_item)?,
            "option" => {
                self.enter_option()?;
                self.parse_block(Self::parse_port_item)?;
                self.option_stack.pop();
            }
            "portoption" => {
                self.enter_portoption()?;
                self.parse_block(Self::parse_port_item)?;
                self.portoption_stack.pop();
            }
            "clock" => {
                if self.port.kind == PortKind::Ar {
                    return self.error("`clock` not allowed in async read port.");
                }
                let kind = match self.peek_token().as_str() {
                    "anyedge" => ClkPolKind::Anyedge,
                    "posedge" => ClkPolKind::Posedge,
                    "negedge" => ClkPolKind::Negedge,
                    other => {
                        return self
                            .error(format!("expected `posedge`, `negedge`, or `anyedge`, got `{}`.", other));
                    }
                };
                self.get_token();
                let name = if self.peek_string() { Some(self.get_string()?) } else { None };
                self.get_semi()?;
                let cap = self.cap(ClockDef { kind, name });
                if self.active {
                    self.port.clock.push(cap);
                }
            }
            "width" => {
                let mut def = WidthDef::default();
                let is_rw = matches!(self.port.kind, PortKind::Srsw | PortKind::Arsw);
                match self.peek_token().as_str() {
                    "tied" => {
                        self.get_token();
                        if !is_rw {
                            return self.error("`tied` only makes sense for read+write ports.");
                        }
                        while self.peek_int() {
                            def.wr_widths.push(self.get_positive_int("width")?);
                        }
                        def.tied = true;
                    }
                    "mix" => {
                        self.get_token();
                        if !is_rw {
                            return self.error("`mix` only makes sense for read+write ports.");
                        }
                        while self.peek_int() {
                            def.wr_widths.push(self.get_positive_int("width")?);
                        }
                        def.rd_widths = def.wr_widths.clone();
                        def.tied = false;
                    }
                    "rd" => {
                        self.get_token();
                        if !is_rw {
                            return self.error("`rd` only makes sense for read+write ports.");
                        }
                        loop {
                            def.rd_widths.push(self.get_positive_int("width")?);
                            if !self.peek_int() {
                                break;
                            }
                        }
                        self.eat_token("wr")?;
                        loop {
                            def.wr_widths.push(self.get_positive_int("width")?);
                            if !self.peek_int() {
                                break;
                            }
                        }
                        def.tied = false;
                    }
                    "wr" => {
                        self.get_token();
                        if !is_rw {
                            return self.error("`wr` only makes sense for read+write ports.");
                        }
                        loop {
                            def.wr_widths.push(self.get_positive_int("width")?);
                            if !self.peek_int() {
                                break;
                            }
                        }
                        self.eat_token("rd")?;
                        loop {
                            def.rd_widths.push(self.get_positive_int("width")?);
                            if !self.peek_int() {
                                break;
                            }
                        }
                        def.tied = false;
                    }
                    _ => {
                        loop {
                            def.wr_widths.push(self.get_positive_int("width")?);
                            if !self.peek_int() {
                                break;
                            }
                        }
                        def.tied = true;
                    }
                }
                self.get_semi()?;
                let cap = self.cap(def);
                if self.active {
                    self.port.width.push(cap);
                }
            }
            "addrce" => {
                self.get_semi()?;
                let cap = self.cap(());
                if self.active {
                    self.port.addrce.push(cap);
                }
            }
            "rden" => {
                if !self.port.kind.is_sync_read() {
                    return self.error("`rden` only allowed on sync read ports.");
                }
                let token = self.get_token();
                let val = match token.as_str() {
                    "none" => RdEnKind::None,
                    "any" => RdEnKind::Any,
                    "write-implies" => {
                        if self.port.kind != PortKind::Srsw {
                            return self.error("`write-implies` only makes sense for read+write ports.");
                        }
                        RdEnKind::WriteImplies
                    }
                    "write-excludes" => {
                        if self.port.kind != PortKind::Srsw {
                            return self.error("`write-excludes` only makes sense for read+write ports.");
                        }
                        RdEnKind::WriteExcludes
                    }
                    other => {
                        return self.error(format!(
                            "expected `none`, `any`, `write-implies`, or `write-excludes`, got `{}`.",
                            other
                        ));
                    }
                };
                self.get_semi()?;
                let cap = self.cap(val);
                if self.active {
                    self.port.rden.push(cap);
                }
            }
            "rdinitval" | "rdsrstval" | "rdarstval" => {
                if !self.port.kind.is_sync_read() {
                    return self.error(format!("`{}` only allowed on sync read ports.", token));
                }
                let kind = match token.as_str() {
                    "rdinitval" => ResetKind::Init,
                    "rdsrstval" => ResetKind::Sync,
                    _ => ResetKind::Async,
                };
                let val_kind = match self.peek_token().as_str() {
                    "none" => {
                        self.get_token();
                        ResetValKind::None
                    }
                    "zero" => {
                        self.get_token();
                        ResetValKind::Zero
                    }
                    _ => ResetValKind::Named(self.get_string()?),
                };
                self.get_semi()?;
                let cap = self.cap(ResetValDef { kind, val_kind });
                if self.active {
                    self.port.rdrstval.push(cap);
                }
            }
            "rdsrstmode" => {
                if !self.port.kind.is_sync_read() {
                    return self.error("`rdsrstmode` only allowed on sync read ports.");
                }
                let token = self.get_token();
                let val = match token.as_str() {
                    "en-over-srst" => SrstKind::EnOverSrst,
                    "srst-over-en" => SrstKind::SrstOverEn,
                    "any" => SrstKind::Any,
                    other => {
                        return self
                            .error(format!("expected `en-over-srst`, `srst-over-en`, or `any`, got `{}`.", other));
                    }
                };
                self.get_semi()?;
                let cap = self.cap(val);
                if self.active {
                    self.port.rdsrstmode.push(cap);
                }
            }
            "wrprio" => {
                if !self.port.kind.is_write() {
                    return self.error("`wrprio` only allowed on write ports.");
                }
                loop {
                    let target = self.get_string()?;
                    let cap = self.cap(target);
                    if self.active {
                        self.port.wrprio.push(cap);
                    }
                    if !self.peek_string() {
                        break;
                    }
                }
                self.get_semi()?;
            }
            "wrtrans" => {
                if !self.port.kind.is_write() {
                    return self.error("`wrtrans` only allowed on write ports.");
                }
                let target = match self.peek_token().as_str() {
                    "self" => {
                        if self.port.kind != PortKind::Srsw {
                            return self.error("`wrtrans self` only allowed on sync read + sync write ports.");
                        }
                        self.get_token();
                        TransTarget::SelfPort
                    }
                    "other" => {
                        self.get_token();
                        TransTarget::OtherPort
                    }
                    _ => TransTarget::Named(self.get_string()?),
                };
                let token = self.get_token();
                let kind = match token.as_str() {
                    "new" => TransKind::New,
                    "old" => TransKind::Old,
                    other => return self.error(format!("expected `new` or `old`, got `{}`.", other)),
                };
                self.get_semi()?;
                let cap = self.cap(WrTransDef { target, kind });
                if self.active {
                    self.port.wrtrans.push(cap);
                }
            }
            "wrcs" => {
                if !self.port.kind.is_write() {
                    return self.error("`wrcs` only allowed on write ports.");
                }
                let val = self.get_positive_int("wrcs")?;
                self.get_semi()?;
                let cap = self.cap(val);
                if self.active {
                    self.port.wrcs.push(cap);
                }
            }
            "" => self.error("unexpected EOF while parsing port item.")?,
            other => self.error(format!("unknown port-level item `{}`.", other))?,
        }
        Ok(())
    }

    fn parse_ram_item(&mut self) -> Result<(), ParseError> {
        let token = self.get_token();
        match token.as_str() {
            "ifdef" => self.parse_conditional(true, Self::parse_ram_item)?,
            "ifndef" => self.parse_conditional(false, Self::parse_ram_item)?,
            "option" => {
                self.enter_option()?;
                self.parse_block(Self::parse_ram_item)?;
                self.option_stack.pop();
            }
            "prune" => {
                self.eat_token("rom")?;
                self.get_semi()?;
                self.ram.prune_rom = true;
            }
            "abits" => {
                let mut dims = MemoryDimsDef::default();
                let abits = self.get_int()?;
                if abits < 0 {
                    return self.error(format!("abits {} negative.", abits));
                }
                dims.abits = abits as usize;
                self.eat_token("dbits")?;
                let mut last = 0;
                loop {
                    let width = self.get_positive_int("dbits")?;
                    if width < last * 2 {
                        return self
                            .error(format!("dbits {} smaller than {} required for progression.", width, last * 2));
                    }
                    last = width;
                    dims.dbits.push(width);
                    if !self.peek_int() {
                        break;
                    }
                }
                if dims.dbits.len() - 1 > dims.abits {
                    return self.error(format!("abits {} too small for dbits progression.", dims.abits));
                }
                if self.peek_token() == "tied" {
                    self.get_token();
                    dims.tied = true;
                }
                dims.resource_count = 1;
                if self.peek_token() == "resource" {
                    self.get_token();
                    dims.resource_name = Some(self.get_string()?);
                    if self.peek_int() {
                        dims.resource_count = self.get_positive_int("resource count")?;
                    }
                }
                self.eat_token("cost")?;
                dims.cost = self.get_double()?;
                self.get_semi()?;
                let cap = self.cap(dims);
                if self.active {
                    self.ram.dims.push(cap);
                }
            }
            "byte" => {
                let val = self.get_positive_int("byte width")?;
                let cap = self.cap(val);
                if self.active {
                    self.ram.byte.push(cap);
                }
                self.get_semi()?;
            }
            "init" => {
                let token = self.get_token();
                let kind = match token.as_str() {
                    "zero" => MemoryInitKind::Zero,
                    "any" => MemoryInitKind::Any,
                    "none" => MemoryInitKind::None,
                    other => return self.error(format!("expected `zero`, `any`, or `none`, got `{}`.", other)),
                };
                self.get_semi()?;
                let cap = self.cap(kind);
                if self.active {
                    self.ram.init.push(cap);
                }
            }
            "style" => {
                loop {
                    let style = self.get_string()?;
                    let cap = self.cap(style);
                    if self.active {
                        self.ram.style.push(cap);
                    }
                    if !self.peek_string() {
                        break;
                    }
                }
                self.get_semi()?;
            }
            "port" => {
                let orig_line = self.line_number;
                self.port = PortGroupDef::default();
                let token = self.get_token();
                self.port.kind = match token.as_str() {
                    "ar" => PortKind::Ar,
                    "sr" => PortKind::Sr,
                    "sw" => PortKind::Sw,
                    "arsw" => PortKind::Arsw,
                    "srsw" => PortKind::Srsw,
                    other => {
                        return self.error(format!("expected `ar`, `sr`, `sw`, `arsw`, or `srsw`, got `{}`.", other));
                    }
                };
                loop {
                    let name = self.get_string()?;
                    self.port.names.push(name);
                    if !self.peek_string() {
                        break;
                    }
                }
                self.parse_block(Self::parse_port_item)?;
                if self.active {
                    // Fill in defaults for capabilities that have a safe one.
                    if self.port.kind != PortKind::Ar && self.port.clock.is_empty() {
                        let cap = self.cap(ClockDef { kind: ClkPolKind::Anyedge, name: None });
                        self.port.clock.push(cap);
                    }
                    if self.port.width.is_empty() {
                        let cap = self.cap(WidthDef { tied: true, ..WidthDef::default() });
                        self.port.width.push(cap);
                    }
                    // There is no safe default for this one, refuse to guess.
                    if self.port.kind.is_sync_read() && self.port.rden.is_empty() {
                        return self.error_at(orig_line, "`rden` capability should be specified.");
                    }
                    let port = std::mem::take(&mut self.port);
                    let cap = self.cap(port);
                    self.ram.ports.push(cap);
                }
            }
            "" => self.error("unexpected EOF while parsing ram item.")?,
            other => self.error(format!("unknown ram-level item `{}`.", other))?,
        }
        Ok(())
    }

    fn parse_top_item(&mut self) -> Result<(), ParseError> {
        let token = self.get_token();
        match token.as_str() {
            "ifdef" => self.parse_conditional(true, Self::parse_top_item)?,
            "ifndef" => self.parse_conditional(false, Self::parse_top_item)?,
            "ram" => {
                let orig_line = self.line_number;
                self.ram = RamDef::default();
                let token = self.get_token();
                self.ram.kind = match token.as_str() {
                    "distributed" => RamKind::Distributed,
                    "block" => RamKind::Block,
                    "huge" => RamKind::Huge,
                    other => {
                        return self.error(format!("expected `distributed`, `block`, or `huge`, got `{}`.", other));
                    }
                };
                self.ram.id = self.get_id()?;
                self.parse_block(Self::parse_ram_item)?;
                if self.active {
                    if self.ram.dims.is_empty() {
                        return self.error_at(orig_line, "`dims` capability should be specified.");
                    }
                    if self.ram.ports.is_empty() {
                        return self.error_at(orig_line, "at least one port group should be specified.");
                    }
                    self.validate_clock_names(orig_line)?;
                    self.validate_widths()?;
                    self.lib.ram_defs.push(std::mem::take(&mut self.ram));
                }
            }
            "" => self.error("unexpected EOF while parsing top item.")?,
            other => self.error(format!("unknown top-level item `{}`.", other))?,
        }
        Ok(())
    }

    /// A named clock is either anyedge everywhere or directed everywhere.
    fn validate_clock_names(&self, orig_line: usize) -> Result<(), ParseError> {
        let mut pnedge_clock = std::collections::BTreeSet::new();
        let mut anyedge_clock = std::collections::BTreeSet::new();
        for port in &self.ram.ports {
            for def in &port.val.clock {
                let Some(name) = &def.val.name else { continue };
                if def.val.kind == ClkPolKind::Anyedge {
                    anyedge_clock.insert(name);
                } else {
                    pnedge_clock.insert(name);
                }
            }
        }
        for name in &pnedge_clock {
            if anyedge_clock.contains(*name) {
                return self.error_at(
                    orig_line,
                    format!("named clock \"{}\" used with both posedge/negedge and anyedge clocks.", name),
                );
            }
        }
        Ok(())
    }

    fn validate_widths(&self) -> Result<(), ParseError> {
        for ddef in &self.ram.dims {
            let dbits = &ddef.val.dbits;
            for bdef in &self.ram.byte {
                if crate::library::opts_conflict(&ddef.opts, &bdef.opts) {
                    continue;
                }
                let byte = bdef.val;
                let ok = dbits[0] % byte == 0 || byte % dbits.last().unwrap() == 0 || dbits.contains(&byte);
                if !ok {
                    return self.error(format!("byte width {} invalid for dbits.", byte));
                }
            }
            for pdef in &self.ram.ports {
                if crate::library::opts_conflict(&ddef.opts, &pdef.opts) {
                    continue;
                }
                for wdef in &pdef.val.width {
                    if crate::library::opts_conflict(&ddef.opts, &wdef.opts) {
                        continue;
                    }
                    if ddef.val.tied && !wdef.val.wr_widths.is_empty() {
                        return self.error("per-port width doesn't make sense for tied dbits.");
                    }
                    self.validate_widthdef(dbits, &wdef.val.wr_widths)?;
                    self.validate_widthdef(dbits, &wdef.val.rd_widths)?;
                }
            }
        }
        Ok(())
    }

    /// A per-port width list must be a contiguous, aligned run of the dims `dbits`.
    fn validate_widthdef(&self, dbits: &[usize], widths: &[usize]) -> Result<(), ParseError> {
        if widths.is_empty() {
            return Ok(());
        }
        for i in 0..dbits.len() {
            if dbits[i] == widths[0] {
                for j in 0..widths.len() {
                    if i + j >= dbits.len() || dbits[i + j] != widths[j] {
                        return self.error(format!("port width {} doesn't match dbits progression.", widths[j]));
                    }
                }
                return Ok(());
            }
        }
        self.error(format!("port width {} invalid for dbits.", widths[0]))
    }
}
