use std::fmt::Write;

use crate::bytecode::Bytecode;
use crate::bytecode::op::{Definition, Opcode, lookup, read_operands};
use crate::lang::object::Object;

/// One line per instruction: `offset mnemonic operands`.
///
/// ```text
/// 0000 OpConstant 1
/// 0003 OpClosure 2 0
/// 0007 OpPop
/// ```
///
/// Undecodable bytes are reported inline as `ERROR: ...` lines rather than
/// aborting, since this is a debugging aid.
pub fn disassemble(ins: &[u8]) -> String {
    let mut out = String::new();
    let mut ip = 0;

    while ip < ins.len() {
        let def = match lookup(ins[ip]) {
            Ok(def) => def,
            Err(e) => {
                let _ = writeln!(out, "ERROR: {}", e);
                ip += 1;
                continue;
            }
        };

        match read_operands(def, &ins[ip + 1..]) {
            Ok((operands, read)) => {
                let _ = writeln!(out, "{:04} {}", ip, format_instruction(def, &operands));
                ip += 1 + read;
            }
            Err(e) => {
                let _ = writeln!(out, "{:04} ERROR: {}", ip, e);
                break;
            }
        }
    }

    out
}

fn format_instruction(def: &Definition, operands: &[usize]) -> String {
    if operands.len() != def.operand_widths.len() {
        return format!(
            "ERROR: operand len {} does not match defined {}",
            operands.len(),
            def.operand_widths.len()
        );
    }

    match operands {
        [] => def.name.to_string(),
        [a] => format!("{} {}", def.name, a),
        [a, b] => format!("{} {} {}", def.name, a, b),
        _ => format!("ERROR: unhandled operand count for {}", def.name),
    }
}

/// Offsets that some jump in `ins` lands on.
fn collect_jump_targets(ins: &[u8]) -> Vec<usize> {
    let mut targets = Vec::new();
    let mut ip = 0;

    while ip < ins.len() {
        let Ok(op) = Opcode::try_from(ins[ip]) else {
            ip += 1;
            continue;
        };
        let Ok((operands, read)) = read_operands(op.definition(), &ins[ip + 1..]) else {
            break;
        };

        if matches!(op, Opcode::Jump | Opcode::JumpNotTruthy) && !targets.contains(&operands[0]) {
            targets.push(operands[0]);
        }
        ip += 1 + read;
    }

    targets
}

/// Full listing of a program: main instructions with jump targets marked,
/// the constant pool, then every compiled function in the pool.
pub fn disassemble_bytecode(bc: &Bytecode) -> String {
    let mut out = String::new();

    write_code_object(&mut out, "main", bc.instructions.as_bytes(), 0);

    if !bc.constants.is_empty() {
        let _ = writeln!(out, "constants:");
        for (i, constant) in bc.constants.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {} {}", i, constant.type_name(), format_constant(constant));
        }
    }

    for (i, constant) in bc.constants.iter().enumerate() {
        if let Object::CompiledFunction(function) = constant {
            let label = match &function.name {
                Some(name) => format!("fn {} (constant {})", name, i),
                None => format!("fn <anonymous> (constant {})", i),
            };
            let _ = writeln!(out);
            write_code_object(&mut out, &label, function.instructions.as_bytes(), 1);
            let _ = writeln!(
                out,
                "  params={} locals={}",
                function.num_parameters, function.num_locals
            );
        }
    }

    out
}

fn format_constant(constant: &Object) -> String {
    match constant {
        Object::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

fn write_code_object(out: &mut String, name: &str, ins: &[u8], indent: usize) {
    let prefix = "  ".repeat(indent);
    let jump_targets = collect_jump_targets(ins);

    let _ = writeln!(out, "{}== {} ({} bytes) ==", prefix, name, ins.len());

    for line in disassemble(ins).lines() {
        let marker = line
            .get(..4)
            .and_then(|offset| offset.parse::<usize>().ok())
            .filter(|offset| jump_targets.contains(offset))
            .map(|_| "► ")
            .unwrap_or("  ");
        let _ = writeln!(out, "{}{}{}", prefix, marker, line);
    }
}
