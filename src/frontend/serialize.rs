//! # Serialization of notation state.
//!
//! Low-tech byte-stream format, bit-exact for compatibility with
//! existing proof objects: strings are NUL-terminated bytes, integers
//! are variable-length unsigneds (7-bit groups, continuation bit),
//! booleans a single byte, doubles textual, lists a length followed by
//! the elements, names a tagged segment chain.
//!
//! Each frontend declaration is written as a tagged record; the `"Imp"`
//! record is the object name, a 32-bit unsigned count, and that many
//! booleans (the implicit-argument flags).

use super::{
    notation::FrontendDecl,
    operator::{self, Fixity, Operator},
};
use crate::{
    error::{Error, Result},
    errorstr,
    kernel::Name,
};
use std::io;

fn ioerr(e: io::Error) -> Error {
    Error::new_string(format!("serialization i/o error: {}", e))
}

fn throw_corrupted<T>() -> Result<T> {
    Err(Error::new("corrupted stream"))
}

/// Low-tech serializer.
pub struct Serializer<W: io::Write> {
    out: W,
}

impl<W: io::Write> Serializer<W> {
    pub fn new(out: W) -> Self {
        Serializer { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// NUL-terminated string. The string must not contain NUL itself.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(Error::new("cannot serialize a string containing NUL"));
        }
        self.out.write_all(s.as_bytes()).map_err(ioerr)?;
        self.out.write_all(&[0]).map_err(ioerr)
    }

    /// Variable-length unsigned: 7-bit groups, low first, continuation
    /// bit set on all but the last.
    pub fn write_unsigned(&mut self, mut v: u64) -> Result<()> {
        loop {
            let b = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                self.out.write_all(&[b | 0x80]).map_err(ioerr)?;
            } else {
                return self.out.write_all(&[b]).map_err(ioerr);
            }
        }
    }

    pub fn write_bool(&mut self, b: bool) -> Result<()> {
        self.out.write_all(&[if b { 1 } else { 0 }]).map_err(ioerr)
    }

    pub fn write_char(&mut self, c: u8) -> Result<()> {
        self.out.write_all(&[c]).map_err(ioerr)
    }

    /// Doubles are written textually.
    pub fn write_double(&mut self, d: f64) -> Result<()> {
        self.write_string(&format!("{}", d))
    }

    /// Name: segment count, then each segment with a string/numeral tag.
    pub fn write_name(&mut self, n: &Name) -> Result<()> {
        let mut segs = Vec::new();
        let mut cur = n.clone();
        while !cur.is_anonymous() {
            segs.push(cur.clone());
            cur = cur.prefix();
        }
        segs.reverse();
        self.write_unsigned(segs.len() as u64)?;
        for s in segs {
            match s.last_num() {
                Some(num) => {
                    self.write_char(1)?;
                    self.write_unsigned(num)?;
                }
                None => {
                    self.write_char(0)?;
                    self.write_string(s.last_str().expect("string segment"))?;
                }
            }
        }
        Ok(())
    }

    /// A list: length, then the elements.
    pub fn write_list<T, F>(&mut self, items: &[T], mut f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        self.write_unsigned(items.len() as u64)?;
        for x in items {
            f(self, x)?;
        }
        Ok(())
    }
}

/// Low-tech deserializer.
pub struct Deserializer<R: io::Read> {
    inp: R,
}

impl<R: io::Read> Deserializer<R> {
    pub fn new(inp: R) -> Self {
        Deserializer { inp }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        match self.inp.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(_) => throw_corrupted(),
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_byte()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        String::from_utf8(bytes).or_else(|_| throw_corrupted())
    }

    pub fn read_unsigned(&mut self) -> Result<u64> {
        let mut v: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_byte()?;
            if shift >= 64 {
                return throw_corrupted();
            }
            v |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_char(&mut self) -> Result<u8> {
        self.read_byte()
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let s = self.read_string()?;
        s.parse().or_else(|_| throw_corrupted())
    }

    pub fn read_name(&mut self) -> Result<Name> {
        let count = self.read_unsigned()?;
        let mut n = Name::anonymous();
        for _ in 0..count {
            match self.read_char()? {
                0 => {
                    let s = self.read_string()?;
                    n = n.append_str(&s);
                }
                1 => {
                    let num = self.read_unsigned()?;
                    n = n.append_num(num);
                }
                _ => return throw_corrupted(),
            }
        }
        Ok(n)
    }
}

fn fixity_code(f: Fixity) -> u8 {
    match f {
        Fixity::Prefix => 0,
        Fixity::Postfix => 1,
        Fixity::Infixl => 2,
        Fixity::Infixr => 3,
        Fixity::Mixfixl => 4,
        Fixity::Mixfixr => 5,
        Fixity::Mixfixc => 6,
        Fixity::Mixfixo => 7,
    }
}

fn fixity_of_code(c: u8) -> Result<Fixity> {
    Ok(match c {
        0 => Fixity::Prefix,
        1 => Fixity::Postfix,
        2 => Fixity::Infixl,
        3 => Fixity::Infixr,
        4 => Fixity::Mixfixl,
        5 => Fixity::Mixfixr,
        6 => Fixity::Mixfixc,
        7 => Fixity::Mixfixo,
        _ => return throw_corrupted(),
    })
}

/// Write one tagged declaration record.
pub fn write_declaration<W: io::Write>(s: &mut Serializer<W>, d: &FrontendDecl) -> Result<()> {
    match d {
        FrontendDecl::MarkImplicit { name, flags } => {
            s.write_string("Imp")?;
            s.write_name(name)?;
            s.write_unsigned(flags.len() as u64)?;
            for b in flags {
                s.write_bool(*b)?;
            }
        }
        FrontendDecl::Notation {
            op,
            denotation,
            led,
        } => {
            s.write_string("Notation")?;
            s.write_char(fixity_code(op.fixity()))?;
            s.write_unsigned(op.precedence() as u64)?;
            s.write_list(op.parts(), |s, p| s.write_name(p))?;
            s.write_name(denotation)?;
            s.write_bool(*led)?;
        }
        FrontendDecl::Coercion { name } => {
            s.write_string("Coercion")?;
            s.write_name(name)?;
        }
        FrontendDecl::Alias { name, target } => {
            s.write_string("Alias")?;
            s.write_name(name)?;
            s.write_name(target)?;
        }
    }
    Ok(())
}

fn mk_operator(fixity: Fixity, parts: Vec<Name>, precedence: u32) -> Result<Operator> {
    if parts.is_empty() {
        return throw_corrupted();
    }
    if fixity.is_mixfix() {
        if parts.len() < 2 {
            return throw_corrupted();
        }
        Ok(match fixity {
            Fixity::Mixfixl => operator::mixfixl(&parts, precedence),
            Fixity::Mixfixr => operator::mixfixr(&parts, precedence),
            Fixity::Mixfixc => operator::mixfixc(&parts, precedence),
            _ => operator::mixfixo(&parts, precedence),
        })
    } else {
        if parts.len() != 1 {
            return throw_corrupted();
        }
        let p = parts.into_iter().next().expect("one part");
        Ok(match fixity {
            Fixity::Prefix => operator::prefix(p, precedence),
            Fixity::Postfix => operator::postfix(p, precedence),
            Fixity::Infixl => operator::infixl(p, precedence),
            _ => operator::infixr(p, precedence),
        })
    }
}

/// Read one tagged declaration record.
pub fn read_declaration<R: io::Read>(d: &mut Deserializer<R>) -> Result<FrontendDecl> {
    let tag = d.read_string()?;
    match tag.as_str() {
        "Imp" => {
            let name = d.read_name()?;
            let count = d.read_unsigned()?;
            let mut flags = Vec::with_capacity(count as usize);
            for _ in 0..count {
                flags.push(d.read_bool()?);
            }
            Ok(FrontendDecl::MarkImplicit { name, flags })
        }
        "Notation" => {
            let fixity = fixity_of_code(d.read_char()?)?;
            let precedence = d.read_unsigned()? as u32;
            let count = d.read_unsigned()?;
            let mut parts = Vec::with_capacity(count as usize);
            for _ in 0..count {
                parts.push(d.read_name()?);
            }
            let denotation = d.read_name()?;
            let led = d.read_bool()?;
            let op = mk_operator(fixity, parts, precedence)?;
            Ok(FrontendDecl::Notation {
                op,
                denotation,
                led,
            })
        }
        "Coercion" => Ok(FrontendDecl::Coercion {
            name: d.read_name()?,
        }),
        "Alias" => Ok(FrontendDecl::Alias {
            name: d.read_name()?,
            target: d.read_name()?,
        }),
        t => Err(errorstr!("unknown declaration tag {:?}", t)),
    }
}
