#![allow(clippy::upper_case_acronyms)]

use bitflags::bitflags;
use itertools::{peek_nth, PeekNth};
use log::{debug, error, trace};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use std::{
    fmt::Display,
    ops::{Add, AddAssign},
    str::{Chars, FromStr},
};

const QUANTIFIER: char = '*';
const WILDCARD: char = '.';
// bytes of an encoded char operand
const CHAR_WIDTH: usize = 4;

/// Error returned by [`Pattern::compile`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// The pattern ends with `*`, leaving it nothing to repeat.
    #[error("dangling '*' at position {position}: nothing follows it")]
    DanglingQuantifier {
        /// Char index of the offending `*`.
        position: usize,
    },
}

// program access errors. never leave this module.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Error {
    OutOfBound,
    InvalidOpcode,
    InvalidOperand,
}

#[derive(Debug, Clone, Copy, IntoPrimitive, TryFromPrimitive, PartialEq, Eq, Display)]
#[repr(u8)]
enum Opcode {
    /* definition	number	opnd?	meaning */
    END = 255,   /* no	End of program. */
    ANY = 3,     /* no	Match any character. */
    EXACTLY = 8, /* chr	Match this character. */
    PLUS = 11,   /* no	Match the next node 1 or more times. */
    BEGIN = 100, /* no	Program begin. */
}
impl Opcode {
    // bytes taken by a node, operand included
    fn width(self) -> usize {
        match self {
            Opcode::EXACTLY => 1 + CHAR_WIDTH,
            _ => 1,
        }
    }
}

// use pc(index in to bincode vec) to simulate pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ProgramCounter(pub usize);
impl Display for ProgramCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ProgramCounter {
    // PC(0) always point to Opcode::BEGIN
    const BEGIN: ProgramCounter = ProgramCounter(0);
}
impl Add<usize> for ProgramCounter {
    type Output = ProgramCounter;

    fn add(self, rhs: usize) -> Self::Output {
        ProgramCounter(self.0 + rhs)
    }
}
impl AddAssign<usize> for ProgramCounter {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}
type PC = ProgramCounter;

// What a single subject char is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Atom {
    Any,
    Exactly(char),
}
impl Atom {
    fn accepts(self, ch: char) -> bool {
        match self {
            Atom::Any => true,
            Atom::Exactly(want) => want == ch,
        }
    }
}

// Compiled pattern. One node per token, BEGIN first and END last.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Program {
    pc: PC,
    bincode: Vec<u8>,
}
impl Program {
    fn new() -> Program {
        Program {
            pc: ProgramCounter(0),
            bincode: vec![],
        }
    }
    fn reserve(&mut self, additional: usize) {
        self.bincode.reserve(additional);
    }
    fn is_out_of_bound(&self, pc: PC, width: usize) -> Result<(), Error> {
        if pc.0 + width > self.pc.0 {
            Err(Error::OutOfBound)
        } else {
            Ok(())
        }
    }
    // return the opcode at the position pc in bincode.
    fn opcode_at(&self, pc: PC) -> Result<Opcode, Error> {
        self.is_out_of_bound(pc, 1)?;
        Opcode::try_from(self.bincode[pc.0]).map_err(|_| Error::InvalidOpcode)
    }
    // return the pc of the node following the one at pc.
    fn next_at(&self, pc: PC) -> Result<PC, Error> {
        let opcode = self.opcode_at(pc)?;
        self.is_out_of_bound(pc, opcode.width())?;
        Ok(pc + opcode.width())
    }
    // char operand of the EXACTLY node at pc.
    fn char_at(&self, pc: PC) -> Result<char, Error> {
        let operand = pc + 1;
        self.is_out_of_bound(operand, CHAR_WIDTH)?;
        let mut digit = [0u8; CHAR_WIDTH];
        digit.copy_from_slice(&self.bincode[operand.0..operand.0 + CHAR_WIDTH]);
        char::try_from(u32::from_be_bytes(digit)).map_err(|_| Error::InvalidOperand)
    }
    fn atom_at(&self, pc: PC) -> Result<Atom, Error> {
        match self.opcode_at(pc)? {
            Opcode::ANY => Ok(Atom::Any),
            Opcode::EXACTLY => Ok(Atom::Exactly(self.char_at(pc)?)),
            _ => Err(Error::InvalidOperand),
        }
    }

    // push a new node in bincode, return origial pc before emit.
    fn emit_node(&mut self, opcode: Opcode) -> PC {
        let old_pc = self.pc;
        self.bincode.push(opcode.into());
        self.pc += 1;
        old_pc
    }
    fn emit_char(&mut self, ch: char) {
        self.bincode.extend_from_slice(&(ch as u32).to_be_bytes());
        self.pc += CHAR_WIDTH;
    }
    fn emit_atom(&mut self, atom: Atom) -> PC {
        match atom {
            Atom::Any => self.emit_node(Opcode::ANY),
            Atom::Exactly(ch) => {
                let pc = self.emit_node(Opcode::EXACTLY);
                self.emit_char(ch);
                pc
            }
        }
    }
}
impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", Opcode::BEGIN)?;
        let mut pc = PC::BEGIN + 1;
        while let Ok(opcode) = self.opcode_at(pc) {
            write!(f, "{:>3}:{}", pc.0, opcode)?;
            if opcode == Opcode::EXACTLY {
                if let Ok(ch) = self.char_at(pc) {
                    write!(f, " {}", ch)?;
                }
            }
            writeln!(f)?;
            pc += opcode.width();
        }
        Ok(())
    }
}

bitflags! {
    /// What kind of tokens a compiled [`Pattern`] contains.
    pub struct PatternFlags: u8 {
        /// Only plain characters.
        const PLAIN      = 0;
        /// Contains `.`.
        const WILDCARD   = 1;
        /// Contains `*`.
        const QUANTIFIED = 2;
        /// Starts with `*`.
        const SPSTART    = 4;
    }
}

// Work-variable struct for pattern compile
struct Comp<'a> {
    parse: Chars<'a>,
    posi: usize, // chars consumed from parse
    program: Program,
    flags: PatternFlags,
    regstart: Option<char>, // char the subject must start with, if known
    width: usize,           // tokens compiled so far
}

impl<'a> Comp<'a> {
    fn compile(exp: &'a str) -> Result<Comp<'a>, PatternError> {
        let mut comp = Comp {
            parse: exp.chars(),
            posi: 0,
            program: Program::new(),
            flags: PatternFlags::PLAIN,
            regstart: None,
            width: 0,
        };
        comp.program.reserve(exp.len() * Opcode::EXACTLY.width() + 2);
        comp.program.emit_node(Opcode::BEGIN);
        while let Some(ch) = comp.exp_next() {
            comp.piece(ch)?;
        }
        comp.program.emit_node(Opcode::END);
        Ok(comp)
    }

    // piece - one atom, optionally preceded by '*'
    fn piece(&mut self, ch: char) -> Result<(), PatternError> {
        let first = self.width == 0;
        let atom = if ch == QUANTIFIER {
            let position = self.posi - 1;
            let operand = self
                .exp_next()
                .ok_or(PatternError::DanglingQuantifier { position })?;
            self.flags |= PatternFlags::QUANTIFIED;
            if first {
                self.flags |= PatternFlags::SPSTART;
            }
            self.program.emit_node(Opcode::PLUS);
            self.atom(operand)
        } else {
            self.atom(ch)
        };
        if first {
            if let Atom::Exactly(ch) = atom {
                self.regstart = Some(ch);
            }
        }
        self.program.emit_atom(atom);
        self.width += 1;
        Ok(())
    }

    // anything but '.' stands for itself, '*' included
    fn atom(&mut self, ch: char) -> Atom {
        if ch == WILDCARD {
            self.flags |= PatternFlags::WILDCARD;
            Atom::Any
        } else {
            Atom::Exactly(ch)
        }
    }

    fn exp_next(&mut self) -> Option<char> {
        let ch = self.parse.next()?;
        self.posi += 1;
        Some(ch)
    }
}

/// A compiled pattern.
///
/// `*` repeats the token that follows it, one or more times, and takes as
/// much of the subject as it can without ever giving it back.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    program: Program,
    flags: PatternFlags,
    regstart: Option<char>,
    width: usize,
}

impl Pattern {
    /// Compiles `exp`. The only malformed pattern is one ending in `*`.
    pub fn compile(exp: &str) -> Result<Pattern, PatternError> {
        let comp = Comp::compile(exp).map_err(|err| {
            debug!("failed to compile {:?}: {}", exp, err);
            err
        })?;
        trace!("compiled {:?}:\n{}", exp, comp.program);
        Ok(Pattern {
            source: exp.to_owned(),
            program: comp.program,
            flags: comp.flags,
            regstart: comp.regstart,
            width: comp.width,
        })
    }

    /// Returns true if the whole of `subject` matches.
    pub fn is_match(&self, subject: &str) -> bool {
        if self.flags.is_empty() {
            return subject == self.source;
        }
        if let Some(start) = self.regstart {
            if !subject.starts_with(start) {
                trace!("{:?} does not start with {:?}", subject, start);
                return false;
            }
        }
        Exec::new(&self.program, subject)
            .run()
            .unwrap_or_else(|err| {
                error!("corrupted program for {:?}: {:?}", self.source, err);
                false
            })
    }

    /// The pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Kinds of tokens the pattern contains.
    pub fn flags(&self) -> PatternFlags {
        self.flags
    }

    /// Fewest subject chars that can match: one per token.
    pub fn min_width(&self) -> usize {
        self.width
    }

    /// Listing of the compiled program, one node per line.
    pub fn disassemble(&self) -> String {
        self.program.to_string()
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::compile(s)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Returns true if the whole of `subject` matches `pattern`.
///
/// Never fails: a malformed pattern simply matches nothing.
pub fn matches(subject: &str, pattern: &str) -> bool {
    Pattern::compile(pattern).is_ok_and(|pattern| pattern.is_match(subject))
}

/*
 * Work-variable struct for vm execute.
 */
struct Exec<'a> {
    program: &'a Program,
    input: PeekNth<Chars<'a>>,
}

impl<'a> Exec<'a> {
    fn new(program: &'a Program, input: &'a str) -> Exec<'a> {
        Exec {
            program,
            input: peek_nth(input.chars()),
        }
    }

    // single forward walk; every node either consumes input or ends the run
    fn run(mut self) -> Result<bool, Error> {
        let mut pc = self.program.next_at(PC::BEGIN)?;
        loop {
            let opcode = self.program.opcode_at(pc)?;
            match opcode {
                Opcode::END => {
                    let rest = self.input.peek().is_some();
                    if rest {
                        trace!("{}:{} subject not exhausted", pc, opcode);
                    }
                    return Ok(!rest);
                }
                Opcode::ANY | Opcode::EXACTLY => {
                    let atom = self.program.atom_at(pc)?;
                    match self.input.next() {
                        Some(ch) if atom.accepts(ch) => {}
                        other => {
                            trace!("{}:{} rejected {:?}", pc, opcode, other);
                            return Ok(false);
                        }
                    }
                    pc = self.program.next_at(pc)?;
                }
                Opcode::PLUS => {
                    let operand = pc + 1;
                    let atom = self.program.atom_at(operand)?;
                    if self.consume_run(atom) == 0 {
                        trace!("{}:{} found no {:?}", pc, opcode, atom);
                        return Ok(false);
                    }
                    pc = self.program.next_at(operand)?;
                }
                Opcode::BEGIN => return Err(Error::InvalidOpcode),
            }
        }
    }

    // greedy: takes every matching char in a row, gives none back
    fn consume_run(&mut self, atom: Atom) -> usize {
        let mut run = 0;
        while let Some(&ch) = self.input.peek() {
            if !atom.accepts(ch) {
                break;
            }
            self.input.next();
            run += 1;
        }
        run
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_program_out_of_bound() {
        let mut prog = Program::new();
        assert_eq!(prog.pc, ProgramCounter(0));

        let pc = prog.emit_atom(Atom::Exactly('a'));
        assert_eq!(prog.is_out_of_bound(pc, Opcode::EXACTLY.width()), Ok(()));
        assert_eq!(prog.is_out_of_bound(pc + 1, CHAR_WIDTH), Ok(()));
        assert_eq!(
            prog.is_out_of_bound(pc + 2, CHAR_WIDTH),
            Err(Error::OutOfBound)
        );
        assert_eq!(prog.opcode_at(pc + 5), Err(Error::OutOfBound));
    }

    #[test]
    fn test_program_emit_node() {
        let mut prog = Program::new();
        {
            let pc = prog.emit_node(Opcode::BEGIN);
            assert_eq!(prog.bincode, vec![Opcode::BEGIN.into()]);
            assert_eq!(pc, ProgramCounter(0));
            assert_eq!(Ok(Opcode::BEGIN), prog.opcode_at(pc));
        }
        {
            let pc = prog.emit_node(Opcode::ANY);
            assert_eq!(prog.bincode, vec![Opcode::BEGIN.into(), Opcode::ANY.into()]);
            assert_eq!(pc, ProgramCounter(1));
            assert_eq!(Ok(Opcode::ANY), prog.opcode_at(pc));
        }
    }

    #[test]
    fn test_program_emit_atom() {
        let mut prog = Program::new();
        let pc = prog.emit_atom(Atom::Exactly('b'));
        assert_eq!(prog.bincode, vec![Opcode::EXACTLY.into(), 0, 0, 0, b'b']);
        assert_eq!(prog.char_at(pc), Ok('b'));
        assert_eq!(prog.atom_at(pc), Ok(Atom::Exactly('b')));
        assert_eq!(prog.next_at(pc), Ok(ProgramCounter(5)));

        let wide = prog.emit_atom(Atom::Exactly('é'));
        assert_eq!(prog.atom_at(wide), Ok(Atom::Exactly('é')));
    }

    #[test]
    fn test_program_invalid_bytes() {
        let mut prog = Program::new();
        prog.bincode = vec![42, Opcode::EXACTLY.into(), 0xff, 0xff, 0xff, 0xff];
        prog.pc = ProgramCounter(6);
        assert_eq!(prog.opcode_at(ProgramCounter(0)), Err(Error::InvalidOpcode));
        assert_eq!(prog.char_at(ProgramCounter(1)), Err(Error::InvalidOperand));
    }

    #[test]
    fn test_plus_operand_must_be_atom() {
        let mut prog = Program::new();
        let plus = prog.emit_node(Opcode::PLUS);
        prog.emit_node(Opcode::END);
        assert_eq!(prog.atom_at(plus), Err(Error::InvalidOperand));
        assert_eq!(prog.atom_at(plus + 1), Err(Error::InvalidOperand));
    }

    #[test]
    fn test_exec_rejects_corrupted_program() {
        let mut prog = Program::new();
        prog.emit_node(Opcode::BEGIN);
        prog.emit_node(Opcode::PLUS);
        assert_eq!(Exec::new(&prog, "a").run(), Err(Error::OutOfBound));

        let mut prog = Program::new();
        prog.emit_node(Opcode::BEGIN);
        prog.emit_node(Opcode::BEGIN);
        assert_eq!(Exec::new(&prog, "").run(), Err(Error::InvalidOpcode));
    }

    #[test]
    fn test_comp_flags() {
        let flags = |exp: &str| Pattern::compile(exp).unwrap().flags();
        assert_eq!(flags(""), PatternFlags::PLAIN);
        assert_eq!(flags("abc"), PatternFlags::PLAIN);
        assert_eq!(flags("a.c"), PatternFlags::WILDCARD);
        assert_eq!(flags("a*bc"), PatternFlags::QUANTIFIED);
        assert_eq!(
            flags("*.z"),
            PatternFlags::QUANTIFIED | PatternFlags::SPSTART | PatternFlags::WILDCARD
        );
    }

    #[test]
    fn test_comp_regstart() {
        let regstart = |exp: &str| Pattern::compile(exp).unwrap().regstart;
        assert_eq!(regstart("abc"), Some('a'));
        assert_eq!(regstart("*bc"), Some('b'));
        assert_eq!(regstart(".bc"), None);
        assert_eq!(regstart("*.c"), None);
        assert_eq!(regstart(""), None);
    }

    #[test]
    fn test_comp_width() {
        assert_eq!(Pattern::compile("").unwrap().min_width(), 0);
        assert_eq!(Pattern::compile("a*bc.z").unwrap().min_width(), 5);
        assert_eq!(Pattern::compile("*a*b*c").unwrap().min_width(), 3);
    }

    #[test]
    fn test_comp_dangling_quantifier() {
        assert_eq!(
            Pattern::compile("a*").unwrap_err(),
            PatternError::DanglingQuantifier { position: 1 }
        );
        assert_eq!(
            Pattern::compile("*").unwrap_err(),
            PatternError::DanglingQuantifier { position: 0 }
        );
        // the second '*' is the operand, the third has nothing left
        assert_eq!(
            Pattern::compile("a***").unwrap_err(),
            PatternError::DanglingQuantifier { position: 3 }
        );
        assert!(Pattern::compile("ab**").is_ok());
        assert_eq!(
            PatternError::DanglingQuantifier { position: 3 }.to_string(),
            "dangling '*' at position 3: nothing follows it"
        );
    }

    #[test]
    fn test_double_star_is_literal_run() {
        let re = Pattern::compile("a**").unwrap();
        assert!(re.is_match("a*"));
        assert!(re.is_match("a***"));
        assert!(!re.is_match("a"));
        assert!(!re.is_match("ab"));
    }

    #[test]
    fn test_any_takes_whole_char() {
        assert!(matches("🔥a", ".a"));
        assert!(matches("🔥🔥", "*."));
        assert!(!matches("🔥", ".."));
    }

    #[test]
    fn test_greedy_no_backtrack() {
        assert!(!matches("aaa", "*aa"));
        assert!(!matches("abc", "*.c"));
        assert!(matches("aab", "*ab"));
    }

    #[test]
    fn test_pattern_program_display() {
        let re = Pattern::compile("a*b.").unwrap();
        assert_eq!(
            re.disassemble(),
            "BEGIN\n  1:EXACTLY a\n  6:PLUS\n  7:EXACTLY b\n 12:ANY\n 13:END\n"
        );
        assert_eq!(Pattern::compile("").unwrap().disassemble(), "BEGIN\n  1:END\n");
    }

    #[test]
    fn test_pattern_display_and_parse() {
        let re: Pattern = "a*bc.z".parse().unwrap();
        assert_eq!(re.to_string(), "a*bc.z");
        assert_eq!(re.as_str(), "a*bc.z");
        assert!("z*".parse::<Pattern>().is_err());
    }
}
