//! The two-pass assembler (spec.md §4.3): text -> labels resolved -> chunks.

mod lexer;

use crate::chunk::Chunk;
use crate::error::AssemblerError;
use crate::opcode::{Arity, Opcode};
use lexer::{is_identifier, tokenize_line};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// An assembled program: an ordered, immutable sequence of chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    chunks: Vec<Chunk>,
}

impl Program {
    /// The chunks, in program order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// `true` if the program has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Serializes to the on-disk form: one decimal integer per line
    /// (spec.md §6.1).
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for chunk in &self.chunks {
            out.push_str(&chunk.value().to_string());
            out.push('\n');
        }
        out
    }

    /// Loads a persisted chunk list: one decimal big integer per line,
    /// blank lines and `#` comments ignored. Does not decode or validate
    /// the chunks; that happens lazily as the engine fetches each one.
    pub fn from_chunk_list(text: &str) -> Result<Self, ChunkListError> {
        let mut chunks = Vec::new();
        for (i, raw_line) in text.lines().enumerate() {
            let without_comment = match raw_line.find('#') {
                Some(idx) => &raw_line[..idx],
                None => raw_line,
            };
            let trimmed = without_comment.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value = trimmed
                .parse::<num_bigint::BigUint>()
                .map_err(|_| ChunkListError::MalformedInteger { line: i + 1 })?;
            chunks.push(Chunk::from_raw(value));
        }
        Ok(Self { chunks })
    }
}

/// An on-disk chunk list contained a line that wasn't a decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkListError {
    /// The offending 1-indexed line.
    #[error("line {line}: not a decimal integer")]
    MalformedInteger {
        /// 1-indexed source line.
        line: usize,
    },
}

struct ScannedLine {
    source_line: usize,
    chunk_index: usize,
    opcode_token: String,
    operand_token: Option<String>,
}

/// Assembles a textual program into a [`Program`].
///
/// Pass 1 ("scan") walks the source once, fixing the chunk index every
/// instruction line will occupy and recording label definitions against
/// those indices. Pass 2 ("emit") resolves operands (literal, or a label
/// name resolved to `target_index - (current_index + 1)`) and invokes the
/// codec. Forward references work because pass 1 already fixed every index
/// before pass 2 resolves anything.
pub fn assemble(source: &str) -> Result<Program, AssemblerError> {
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut label_first_line: HashMap<String, usize> = HashMap::new();
    let mut scanned = Vec::new();
    let mut pending_labels: Vec<(String, usize)> = Vec::new();
    let mut chunk_index = 0usize;

    for (i, raw_line) in source.lines().enumerate() {
        let source_line = i + 1;
        let Some(parsed) = tokenize_line(raw_line) else {
            continue;
        };

        if let Some(label) = &parsed.label {
            if let Some(&first_line) = label_first_line.get(label) {
                return Err(AssemblerError::DuplicateLabel {
                    line: source_line,
                    first_line,
                    label: label.clone(),
                });
            }
            label_first_line.insert(label.clone(), source_line);
            pending_labels.push((label.clone(), source_line));
        }

        if let Some(opcode_token) = parsed.opcode {
            for (label, _) in pending_labels.drain(..) {
                labels.insert(label, chunk_index);
            }
            scanned.push(ScannedLine {
                source_line,
                chunk_index,
                opcode_token,
                operand_token: parsed.operand,
            });
            chunk_index += 1;
        }
    }

    // Any labels left pending (trailing label-only lines at EOF) attach to
    // one-past-the-end; a JMP to them is well-defined only if the program
    // never executes past its last chunk, which is the caller's concern.
    for (label, _) in pending_labels.drain(..) {
        labels.insert(label, chunk_index);
    }

    let mut chunks = Vec::with_capacity(scanned.len());
    for line in scanned {
        let opcode = Opcode::from_str(&line.opcode_token).map_err(|_| AssemblerError::UnknownOpcode {
            line: line.source_line,
            mnemonic: line.opcode_token.clone(),
        })?;

        let operand = resolve_operand(&opcode, &line, &labels)?;
        chunks.push(Chunk::encode(opcode, &operand));
    }

    Ok(Program { chunks })
}

fn resolve_operand(
    opcode: &Opcode,
    line: &ScannedLine,
    labels: &HashMap<String, usize>,
) -> Result<BigInt, AssemblerError> {
    match (opcode.arity(), &line.operand_token) {
        (Arity::Zero, None) => Ok(BigInt::from(0)),
        (Arity::Zero, Some(tok)) => Err(AssemblerError::ArityMismatch {
            line: line.source_line,
            message: format!("`{}` takes no operand, found `{}`", line.opcode_token, tok),
        }),
        (Arity::One, None) => Err(AssemblerError::ArityMismatch {
            line: line.source_line,
            message: format!("`{}` requires an operand", line.opcode_token),
        }),
        (Arity::One, Some(tok)) => parse_operand(opcode, line, tok, labels),
    }
}

fn parse_operand(
    opcode: &Opcode,
    line: &ScannedLine,
    token: &str,
    labels: &HashMap<String, usize>,
) -> Result<BigInt, AssemblerError> {
    if let Ok(literal) = BigInt::from_str(token) {
        return Ok(literal);
    }

    if is_identifier(token) {
        return match labels.get(token) {
            Some(&target_index) => {
                let offset = target_index as i64 - (line.chunk_index as i64 + 1);
                Ok(BigInt::from(offset))
            }
            None => Err(AssemblerError::UnknownSymbol {
                line: line.source_line,
                label: token.to_string(),
            }),
        };
    }

    let _ = opcode;
    Err(AssemblerError::MalformedOperand {
        line: line.source_line,
        token: token.to_string(),
    })
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program({} chunks)", self.chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_countdown() {
        let src = r#"
            PUSH 3
            STORE 0
            loop:
            LOAD 0
            PRINT
            LOAD 0
            PUSH 1
            SUB
            STORE 0
            LOAD 0
            JNZ loop
            HALT
        "#;
        let program = assemble(src).expect("should assemble");
        assert_eq!(program.len(), 11);
    }

    #[test]
    fn forward_reference_resolves() {
        let src = r#"
            JMP skip
            PUSH 999
            skip:
            HALT
        "#;
        let program = assemble(src).expect("should assemble");
        let (op, operand) = program.chunks()[0].decode().unwrap();
        assert_eq!(op, Opcode::Jmp);
        // target_index (2) - (current_index 0 + 1) = 1
        assert_eq!(operand, BigInt::from(1));
    }

    #[test]
    fn negative_jump_back_to_self() {
        let src = "loop: PUSH 0\nPRINT\nJMP loop\n";
        let program = assemble(src).expect("should assemble");
        let (op, operand) = program.chunks()[2].decode().unwrap();
        assert_eq!(op, Opcode::Jmp);
        // target_index (0) - (current_index 2 + 1) = -3
        assert_eq!(operand, BigInt::from(-3));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let src = "a: NOP\na: NOP\n";
        let err = assemble(src).unwrap_err();
        assert!(matches!(err, AssemblerError::DuplicateLabel { .. }));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let err = assemble("FROBNICATE 1\n").unwrap_err();
        assert!(matches!(err, AssemblerError::UnknownOpcode { .. }));
    }

    #[test]
    fn unknown_label_is_an_error() {
        let err = assemble("JMP nowhere\n").unwrap_err();
        assert!(matches!(err, AssemblerError::UnknownSymbol { .. }));
    }

    #[test]
    fn arity_mismatches_are_errors() {
        assert!(matches!(
            assemble("PUSH\n").unwrap_err(),
            AssemblerError::ArityMismatch { .. }
        ));
        assert!(matches!(
            assemble("HALT 1\n").unwrap_err(),
            AssemblerError::ArityMismatch { .. }
        ));
    }

    #[test]
    fn assembling_twice_is_deterministic() {
        let src = "PUSH 1\nPUSH 2\nADD\nPRINT\nHALT\n";
        let a = assemble(src).unwrap();
        let b = assemble(src).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn persisted_form_roundtrips() {
        let src = "PUSH 1\nPUSH 2\nADD\nPRINT\nHALT\n";
        let program = assemble(src).unwrap();
        let text = program.to_text();
        let reloaded = Program::from_chunk_list(&text).unwrap();
        assert_eq!(program, reloaded);
    }
}
