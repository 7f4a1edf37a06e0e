//! starmatch - pattern matching with a forward-binding star
//!
//! ## Usage
//!
//! ```
//! use starmatch::{matches, Pattern};
//!
//! assert!(matches("abbbbcyz", "a*bc.z"));
//! assert!(!matches("abbbbc", "ab*c"));
//!
//! let pattern: Pattern = "*a*b*c".parse().unwrap();
//! assert!(pattern.is_match("aaabbbcc"));
//! ```
//!
//! ## Patterns:
//!
//! ```text
//!     char        match itself, emit code 'EXACTLY char'
//!
//!      .          match any single character. emit code 'ANY'
//!
//!      *          applies to the character FOLLOWING it, matching one or
//!                 more consecutive occurrences of it. '*.' takes a run of
//!                 any characters, '**' a run of literal '*'.
//!                 emit code 'PLUS' followed by the operand node.
//! ```
//!
//! A pattern always has to consume the whole subject. A star takes the
//! longest run it can and never hands characters back, so `*aa` can not
//! match anything: the star eats every `a` and the trailing `a` starves.
//!
//! ## Code emit example
//! ```text
//!     Pattern::compile("a*b.").disassemble()
//!     result :
//!         BEGIN
//!           1:EXACTLY a
//!           6:PLUS
//!           7:EXACTLY b
//!          12:ANY
//!          13:END
//! ```
#[macro_use]
extern crate enum_display_derive;

mod pattern;

pub use pattern::{matches, Pattern, PatternError, PatternFlags};
