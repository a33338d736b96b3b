//! Textual bytecode assembler
//!
//! Reads the surface produced by [`pretty`](super::pretty) (and written
//! by hand in tests and tools):
//!
//! ```text
//! struct NAME ( WIDTH* );
//! data NAME WIDTH { NUM* };
//! data NAME WIDTH "ascii text";
//! proc NAME ( WIDTH* - WIDTH* ) { INSTR* };
//! ```
//!
//! Multi-block procedures number their blocks:
//!
//! ```text
//! proc NAME ( - w ) { 0 { ... } 1 { ... } };
//! ```
//!
//! Tokens are identifiers (dots allowed, so qualified names are single
//! tokens), decimal numbers, double-quoted strings, the punctuation
//! `{ } ( ) - ; :`, line comments `//…`, and whitespace. Names stand in
//! for ids; a call to a name not defined as a proc in the file becomes
//! an import. A string in data position expands to its bytes followed
//! by a NUL.

use super::{
    CallTarget, Instr, Pz, PzBlock, PzData, PzProc, PzSignature, PzStruct, Width,
};
use crate::core::QName;
use crate::util::loc::Loc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// An assembler error with its source position
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{loc}: {message}")]
pub struct AsmError {
    pub loc: Loc,
    pub message: String,
}

impl AsmError {
    fn new(loc: Loc, message: impl Into<String>) -> Self {
        Self {
            loc,
            message: message.into(),
        }
    }
}

/// Parse and assemble a textual program
pub fn assemble(file: &str, src: &str) -> Result<Pz, AsmError> {
    let tokens = lex(file, src)?;
    Parser::new(file, tokens).program()
}

// ----------------------------------------------------------------------
// Lexer
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Num(u64),
    Str(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Dash,
    Semi,
    Colon,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("`{}`", s),
            Tok::Num(n) => format!("`{}`", n),
            Tok::Str(_) => "string".to_string(),
            Tok::LBrace => "`{`".to_string(),
            Tok::RBrace => "`}`".to_string(),
            Tok::LParen => "`(`".to_string(),
            Tok::RParen => "`)`".to_string(),
            Tok::Dash => "`-`".to_string(),
            Tok::Semi => "`;`".to_string(),
            Tok::Colon => "`:`".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn lex(file: &str, src: &str) -> Result<Vec<Token>, AsmError> {
    let file: Arc<str> = Arc::from(file);
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            line += 1;
                            break;
                        }
                    }
                } else {
                    return Err(AsmError::new(
                        Loc::new(file.clone(), line),
                        "unexpected character `/`",
                    ));
                }
            }
            '{' | '}' | '(' | ')' | '-' | ';' | ':' => {
                chars.next();
                let tok = match c {
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '-' => Tok::Dash,
                    ';' => Tok::Semi,
                    _ => Tok::Colon,
                };
                tokens.push(Token { tok, line });
            }
            '"' => {
                chars.next();
                let start_line = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\n') | None => {
                            return Err(AsmError::new(
                                Loc::new(file.clone(), start_line),
                                "unterminated string",
                            ));
                        }
                        Some(c) => s.push(c),
                    }
                }
                tokens.push(Token {
                    tok: Tok::Str(s),
                    line: start_line,
                });
            }
            c if c.is_ascii_digit() => {
                let mut n: u64 = 0;
                while let Some(&d) = chars.peek() {
                    if let Some(digit) = d.to_digit(10) {
                        n = n
                            .checked_mul(10)
                            .and_then(|n| n.checked_add(digit as u64))
                            .ok_or_else(|| {
                                AsmError::new(Loc::new(file.clone(), line), "number too large")
                            })?;
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    tok: Tok::Num(n),
                    line,
                });
            }
            c if is_ident_start(c) => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if is_ident_continue(c) {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    tok: Tok::Ident(s),
                    line,
                });
            }
            c => {
                return Err(AsmError::new(
                    Loc::new(file.clone(), line),
                    format!("unexpected character `{}`", c),
                ));
            }
        }
    }

    Ok(tokens)
}

// ----------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------

/// A parsed instruction before name resolution
#[derive(Debug)]
enum RawInstr {
    Plain(Instr),
    LoadData { name: String, loc: Loc },
    Call { name: String, tail: bool },
    Alloc { name: String, loc: Loc },
    Store { name: String, field: u32, loc: Loc },
    Load { name: String, field: u32, width: Width, loc: Loc },
}

struct RawProc {
    name: String,
    sig: PzSignature,
    blocks: Option<Vec<Vec<RawInstr>>>,
}

enum RawData {
    Array { width: Width, values: Vec<u64> },
    Struct { struct_name: String, values: Vec<u64>, loc: Loc },
}

struct Parser {
    file: Arc<str>,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(file: &str, tokens: Vec<Token>) -> Self {
        Self {
            file: Arc::from(file),
            tokens,
            pos: 0,
        }
    }

    fn loc(&self) -> Loc {
        let line = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(1);
        Loc::new(self.file.clone(), line)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.tokens.get(self.pos + 1).map(|t| &t.tok)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Tok) -> Result<(), AsmError> {
        match self.next() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(self.err_at_prev(format!(
                "expected {}, found {}",
                want.describe(),
                tok.describe()
            ))),
            None => Err(self.err_here(format!("expected {}, found end of file", want.describe()))),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, AsmError> {
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s),
            Some(tok) => Err(self.err_at_prev(format!("expected {}, found {}", what, tok.describe()))),
            None => Err(self.err_here(format!("expected {}, found end of file", what))),
        }
    }

    fn number(&mut self, what: &str) -> Result<u64, AsmError> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(n),
            Some(tok) => Err(self.err_at_prev(format!("expected {}, found {}", what, tok.describe()))),
            None => Err(self.err_here(format!("expected {}, found end of file", what))),
        }
    }

    fn width(&mut self) -> Result<Width, AsmError> {
        let name = self.ident("a width")?;
        Width::from_name(&name)
            .ok_or_else(|| self.err_at_prev(format!("`{}` is not a width", name)))
    }

    fn err_here(&self, message: String) -> AsmError {
        AsmError::new(self.loc(), message)
    }

    fn err_at_prev(&self, message: String) -> AsmError {
        let line = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.line)
            .unwrap_or(1);
        AsmError::new(Loc::new(self.file.clone(), line), message)
    }

    // ------------------------------------------------------------------

    fn program(mut self) -> Result<Pz, AsmError> {
        let mut structs: Vec<(String, PzStruct)> = Vec::new();
        let mut datas: Vec<(String, RawData)> = Vec::new();
        let mut procs: Vec<RawProc> = Vec::new();

        while self.peek().is_some() {
            let directive = self.ident("a directive")?;
            match directive.as_str() {
                "struct" => structs.push(self.struct_directive()?),
                "data" => datas.push(self.data_directive()?),
                "proc" => procs.push(self.proc_directive()?),
                other => {
                    return Err(self.err_at_prev(format!(
                        "expected `struct`, `data` or `proc`, found `{}`",
                        other
                    )));
                }
            }
        }

        self.resolve(structs, datas, procs)
    }

    fn struct_directive(&mut self) -> Result<(String, PzStruct), AsmError> {
        let name = self.ident("a struct name")?;
        self.expect(Tok::LParen)?;
        let mut fields = Vec::new();
        while self.peek() != Some(&Tok::RParen) {
            fields.push(self.width()?);
        }
        self.expect(Tok::RParen)?;
        self.expect(Tok::Semi)?;
        Ok((name, PzStruct::new(fields)))
    }

    fn data_directive(&mut self) -> Result<(String, RawData), AsmError> {
        let name = self.ident("a data name")?;
        let loc = self.loc();
        let shape = self.ident("a width or struct name")?;
        let data = if let Some(width) = Width::from_name(&shape) {
            let values = self.data_values(width)?;
            RawData::Array { width, values }
        } else {
            let values = self.data_values(Width::WFast)?;
            RawData::Struct {
                struct_name: shape,
                values,
                loc,
            }
        };
        self.expect(Tok::Semi)?;
        Ok((name, data))
    }

    fn data_values(&mut self, width: Width) -> Result<Vec<u64>, AsmError> {
        // either a quoted string or a braced number list
        if let Some(Tok::Str(_)) = self.peek() {
            let s = match self.next() {
                Some(Tok::Str(s)) => s,
                _ => unreachable!("peeked"),
            };
            if width != Width::W8 {
                return Err(self.err_at_prev("string data must have width w8".to_string()));
            }
            if !s.is_ascii() {
                return Err(self.err_at_prev("string data must be ASCII".to_string()));
            }
            let mut values: Vec<u64> = s.bytes().map(u64::from).collect();
            values.push(0);
            return Ok(values);
        }
        self.expect(Tok::LBrace)?;
        let mut values = Vec::new();
        while self.peek() != Some(&Tok::RBrace) {
            values.push(self.number("a value")?);
        }
        self.expect(Tok::RBrace)?;
        Ok(values)
    }

    fn proc_directive(&mut self) -> Result<RawProc, AsmError> {
        let name = self.ident("a procedure name")?;
        self.expect(Tok::LParen)?;
        let mut before = Vec::new();
        while self.peek() != Some(&Tok::Dash) {
            before.push(self.width()?);
        }
        self.expect(Tok::Dash)?;
        let mut after = Vec::new();
        while self.peek() != Some(&Tok::RParen) {
            after.push(self.width()?);
        }
        self.expect(Tok::RParen)?;
        let sig = PzSignature::new(before, after);

        // `proc NAME ( ... );` declares without a body
        if self.peek() == Some(&Tok::Semi) {
            self.next();
            return Ok(RawProc {
                name,
                sig,
                blocks: None,
            });
        }

        self.expect(Tok::LBrace)?;
        let blocks = if matches!(self.peek(), Some(Tok::Num(_))) && self.peek2() == Some(&Tok::LBrace)
        {
            let mut blocks = Vec::new();
            while self.peek() != Some(&Tok::RBrace) {
                let index = self.number("a block number")?;
                if index as usize != blocks.len() {
                    return Err(
                        self.err_at_prev(format!("expected block {}, found {}", blocks.len(), index))
                    );
                }
                self.expect(Tok::LBrace)?;
                blocks.push(self.instrs_until_rbrace()?);
                self.expect(Tok::RBrace)?;
            }
            blocks
        } else {
            vec![self.instrs_until_rbrace()?]
        };
        self.expect(Tok::RBrace)?;
        self.expect(Tok::Semi)?;

        Ok(RawProc {
            name,
            sig,
            blocks: Some(blocks),
        })
    }

    fn instrs_until_rbrace(&mut self) -> Result<Vec<RawInstr>, AsmError> {
        let mut instrs = Vec::new();
        while self.peek() != Some(&Tok::RBrace) {
            instrs.push(self.instr()?);
        }
        Ok(instrs)
    }

    fn suffix_width(&mut self, mnemonic: &str) -> Result<Width, AsmError> {
        if self.peek() == Some(&Tok::Colon) {
            self.next();
            self.width()
        } else {
            Err(self.err_here(format!("`{}` needs a `:width` suffix", mnemonic)))
        }
    }

    fn instr(&mut self) -> Result<RawInstr, AsmError> {
        let loc = self.loc();
        let mn = self.ident("an instruction")?;
        let raw = match mn.as_str() {
            "load_immediate" => {
                let w = self.suffix_width(&mn)?;
                let n = self.number("an immediate value")?;
                RawInstr::Plain(Instr::LoadImmediate(w, n))
            }
            "load_data" => RawInstr::LoadData {
                name: self.ident("a data name")?,
                loc,
            },
            "add" => RawInstr::Plain(Instr::Add(self.suffix_width(&mn)?)),
            "sub" => RawInstr::Plain(Instr::Sub(self.suffix_width(&mn)?)),
            "mul" => RawInstr::Plain(Instr::Mul(self.suffix_width(&mn)?)),
            "div" => RawInstr::Plain(Instr::Div(self.suffix_width(&mn)?)),
            "mod" => RawInstr::Plain(Instr::Mod(self.suffix_width(&mn)?)),
            "and" => RawInstr::Plain(Instr::And(self.suffix_width(&mn)?)),
            "or" => RawInstr::Plain(Instr::Or(self.suffix_width(&mn)?)),
            "xor" => RawInstr::Plain(Instr::Xor(self.suffix_width(&mn)?)),
            "not" => RawInstr::Plain(Instr::Not(self.suffix_width(&mn)?)),
            "lshift" => RawInstr::Plain(Instr::Lshift(self.suffix_width(&mn)?)),
            "rshift" => RawInstr::Plain(Instr::Rshift(self.suffix_width(&mn)?)),
            "lt" => RawInstr::Plain(Instr::Lt(self.suffix_width(&mn)?)),
            "gt" => RawInstr::Plain(Instr::Gt(self.suffix_width(&mn)?)),
            "eq" => RawInstr::Plain(Instr::Eq(self.suffix_width(&mn)?)),
            "drop" => RawInstr::Plain(Instr::Drop),
            "pick" => RawInstr::Plain(Instr::Pick(self.number("a stack distance")? as u32)),
            "roll" => RawInstr::Plain(Instr::Roll(self.number("a stack distance")? as u32)),
            "call" => RawInstr::Call {
                name: self.ident("a procedure name")?,
                tail: false,
            },
            "tcall" => RawInstr::Call {
                name: self.ident("a procedure name")?,
                tail: true,
            },
            "cjmp" => RawInstr::Plain(Instr::CJmp(self.number("a block number")? as usize)),
            "jmp" => RawInstr::Plain(Instr::Jmp(self.number("a block number")? as usize)),
            "ret" => RawInstr::Plain(Instr::Ret),
            "alloc" => RawInstr::Alloc {
                name: self.ident("a struct name")?,
                loc,
            },
            "store" => RawInstr::Store {
                name: self.ident("a struct name")?,
                field: self.number("a field number")? as u32,
                loc,
            },
            "load" => {
                let name = self.ident("a struct name")?;
                let field = self.number("a field number")? as u32;
                let width = self.width()?;
                RawInstr::Load {
                    name,
                    field,
                    width,
                    loc,
                }
            }
            other => {
                return Err(self.err_at_prev(format!("unknown instruction `{}`", other)));
            }
        };
        Ok(raw)
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    fn resolve(
        &self,
        structs: Vec<(String, PzStruct)>,
        datas: Vec<(String, RawData)>,
        procs: Vec<RawProc>,
    ) -> Result<Pz, AsmError> {
        let mut pz = Pz::new();

        let mut struct_ids = HashMap::new();
        for (name, s) in structs {
            let id = pz.add_struct(s);
            struct_ids.insert(name, id);
        }

        let mut data_ids = HashMap::new();
        for (name, d) in datas {
            let d = match d {
                RawData::Array { width, values } => PzData::Array { width, values },
                RawData::Struct {
                    struct_name,
                    values,
                    loc,
                } => {
                    let struct_id = *struct_ids.get(&struct_name).ok_or_else(|| {
                        AsmError::new(loc, format!("unknown struct `{}`", struct_name))
                    })?;
                    PzData::Struct { struct_id, values }
                }
            };
            let id = pz.add_data(d);
            data_ids.insert(name, id);
        }

        // procedure names are visible to every body, forward or backward
        let mut proc_ids = HashMap::new();
        for raw in &procs {
            let id = pz.add_proc(PzProc::new(
                QName::from_dotted(&raw.name),
                raw.sig.clone(),
            ));
            proc_ids.insert(raw.name.clone(), id);
        }

        let mut import_ids: HashMap<String, super::PzImportId> = HashMap::new();
        for (i, raw) in procs.into_iter().enumerate() {
            let blocks = match raw.blocks {
                None => continue,
                Some(blocks) => blocks,
            };
            let mut resolved = Vec::with_capacity(blocks.len());
            for block in blocks {
                let mut instrs = Vec::with_capacity(block.len());
                for instr in block {
                    instrs.push(self.resolve_instr(
                        instr,
                        &mut pz,
                        &struct_ids,
                        &data_ids,
                        &proc_ids,
                        &mut import_ids,
                    )?);
                }
                resolved.push(PzBlock { instrs });
            }
            pz.procs[i].blocks = Some(resolved);
        }

        Ok(pz)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_instr(
        &self,
        raw: RawInstr,
        pz: &mut Pz,
        struct_ids: &HashMap<String, super::PzStructId>,
        data_ids: &HashMap<String, super::PzDataId>,
        proc_ids: &HashMap<String, super::PzProcId>,
        import_ids: &mut HashMap<String, super::PzImportId>,
    ) -> Result<Instr, AsmError> {
        Ok(match raw {
            RawInstr::Plain(i) => i,
            RawInstr::LoadData { name, loc } => {
                let id = *data_ids
                    .get(&name)
                    .ok_or_else(|| AsmError::new(loc, format!("unknown data `{}`", name)))?;
                Instr::LoadData(id)
            }
            RawInstr::Call { name, tail } => {
                let target = if let Some(&id) = proc_ids.get(&name) {
                    CallTarget::Proc(id)
                } else {
                    let id = *import_ids.entry(name.clone()).or_insert_with(|| {
                        pz.add_import(QName::from_dotted(&name), None)
                    });
                    CallTarget::Import(id)
                };
                if tail {
                    Instr::TCall(target)
                } else {
                    Instr::Call(target)
                }
            }
            RawInstr::Alloc { name, loc } => {
                let id = *struct_ids
                    .get(&name)
                    .ok_or_else(|| AsmError::new(loc, format!("unknown struct `{}`", name)))?;
                Instr::Alloc(id)
            }
            RawInstr::Store { name, field, loc } => {
                let id = *struct_ids
                    .get(&name)
                    .ok_or_else(|| AsmError::new(loc, format!("unknown struct `{}`", name)))?;
                Instr::Store(id, field)
            }
            RawInstr::Load {
                name,
                field,
                width,
                loc,
            } => {
                let id = *struct_ids
                    .get(&name)
                    .ok_or_else(|| AsmError::new(loc, format!("unknown struct `{}`", name)))?;
                Instr::Load(id, field, width)
            }
        })
    }
}
