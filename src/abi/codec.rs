// src/abi/codec.rs
//
// Head/tail binary codec for the contract ABI. Encoding validates widths
// and shapes up front, naming the offending parameter; decoding is strict
// (zero padding, proper sign extension, valid UTF-8) and reports the byte
// offset where it broke.

use ethers_core::types::{Address, I256, U256};

use crate::abi::{FunctionAbi, ParamKind, Value};
use crate::rpc::error::GatewayError;

const WORD: usize = 32;

/// Encode a function call: selector followed by the encoded arguments.
pub fn encode_call(func: &FunctionAbi, args: &[Value]) -> Result<Vec<u8>, GatewayError> {
    if func.inputs.len() != args.len() {
        return Err(GatewayError::invalid_argument(format!(
            "function '{}' expects {} argument(s), got {}",
            func.name,
            func.inputs.len(),
            args.len()
        )));
    }
    for (i, (param, value)) in func.inputs.iter().zip(args).enumerate() {
        let label = if param.name.is_empty() { format!("#{i}") } else { param.name.clone() };
        check_value(&param.kind, value, &label)?;
    }

    let kinds: Vec<ParamKind> = func.inputs.iter().map(|p| p.kind.clone()).collect();
    let mut out = func.selector().to_vec();
    out.extend(encode_values(&kinds, args)?);
    Ok(out)
}

/// Decode a function's return data into typed values.
pub fn decode_output(func: &FunctionAbi, data: &[u8]) -> Result<Vec<Value>, GatewayError> {
    let kinds: Vec<ParamKind> = func.outputs.iter().map(|p| p.kind.clone()).collect();
    decode_values(&kinds, data)
}

/// Validate that `value` is assignable to `kind`, naming `param` on
/// mismatch. Runs before encoding so width/shape errors surface as
/// `InvalidArgument` with a precise location.
fn check_value(kind: &ParamKind, value: &Value, param: &str) -> Result<(), GatewayError> {
    let mismatch = || {
        GatewayError::invalid_argument(format!(
            "parameter '{param}' expects {kind}, got an incompatible value"
        ))
    };
    match (kind, value) {
        (ParamKind::Uint(w), Value::Uint(v, vw)) => {
            if w != vw {
                return Err(mismatch());
            }
            if *w < 256 && (*v >> *w) != U256::zero() {
                return Err(GatewayError::invalid_argument(format!(
                    "parameter '{param}' does not fit in uint{w}"
                )));
            }
            Ok(())
        }
        (ParamKind::Int(w), Value::Int(v, vw)) => {
            if w != vw {
                return Err(mismatch());
            }
            if !int_fits(*v, *w) {
                return Err(GatewayError::invalid_argument(format!(
                    "parameter '{param}' does not fit in int{w}"
                )));
            }
            Ok(())
        }
        (ParamKind::Address, Value::Address(_))
        | (ParamKind::Bool, Value::Bool(_))
        | (ParamKind::Bytes, Value::Bytes(_))
        | (ParamKind::String, Value::String(_)) => Ok(()),
        (ParamKind::FixedBytes(n), Value::FixedBytes(b)) => {
            if b.len() == *n {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        (ParamKind::Array(inner), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_value(inner, item, &format!("{param}[{i}]"))?;
            }
            Ok(())
        }
        (ParamKind::FixedArray(inner, n), Value::Array(items)) => {
            if items.len() != *n {
                return Err(GatewayError::invalid_argument(format!(
                    "parameter '{param}' expects {n} element(s), got {}",
                    items.len()
                )));
            }
            for (i, item) in items.iter().enumerate() {
                check_value(inner, item, &format!("{param}[{i}]"))?;
            }
            Ok(())
        }
        (ParamKind::Tuple(kinds), Value::Tuple(items)) => {
            if items.len() != kinds.len() {
                return Err(mismatch());
            }
            for (i, (k, item)) in kinds.iter().zip(items).enumerate() {
                check_value(k, item, &format!("{param}.{i}"))?;
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}

fn int_fits(v: I256, width: usize) -> bool {
    if width == 256 {
        return true;
    }
    let raw = v.into_raw();
    if v.is_negative() {
        // All bits from the sign bit up must already be set.
        raw >> (width - 1) == U256::MAX >> (width - 1)
    } else {
        raw >> (width - 1) == U256::zero()
    }
}

/// Encode one frame of values (a parameter list, tuple body, or array
/// body) in the head/tail layout.
pub fn encode_values(kinds: &[ParamKind], values: &[Value]) -> Result<Vec<u8>, GatewayError> {
    if kinds.len() != values.len() {
        return Err(GatewayError::invalid_argument(format!(
            "expected {} value(s), got {}",
            kinds.len(),
            values.len()
        )));
    }
    let head_size: usize = kinds.iter().map(ParamKind::head_size).sum();
    let mut head = Vec::with_capacity(head_size);
    let mut tail: Vec<u8> = Vec::new();

    for (kind, value) in kinds.iter().zip(values) {
        if kind.is_dynamic() {
            head.extend_from_slice(&usize_word(head_size + tail.len()));
            tail.extend(encode_tail(kind, value)?);
        } else {
            head.extend(encode_static(kind, value)?);
        }
    }
    head.extend(tail);
    Ok(head)
}

fn encode_static(kind: &ParamKind, value: &Value) -> Result<Vec<u8>, GatewayError> {
    let shape_error = || {
        GatewayError::invalid_argument(format!("value does not match ABI type {kind}"))
    };
    match (kind, value) {
        (ParamKind::Uint(_), Value::Uint(v, _)) => Ok(u256_word(*v).to_vec()),
        (ParamKind::Int(_), Value::Int(v, _)) => Ok(u256_word(v.into_raw()).to_vec()),
        (ParamKind::Address, Value::Address(a)) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(a.as_bytes());
            Ok(word.to_vec())
        }
        (ParamKind::Bool, Value::Bool(b)) => {
            let mut word = [0u8; WORD];
            word[31] = u8::from(*b);
            Ok(word.to_vec())
        }
        (ParamKind::FixedBytes(n), Value::FixedBytes(b)) if b.len() == *n => {
            let mut word = [0u8; WORD];
            word[..*n].copy_from_slice(b);
            Ok(word.to_vec())
        }
        (ParamKind::FixedArray(inner, n), Value::Array(items)) if items.len() == *n => {
            let kinds = vec![(**inner).clone(); *n];
            encode_values(&kinds, items)
        }
        (ParamKind::Tuple(kinds), Value::Tuple(items)) => encode_values(kinds, items),
        _ => Err(shape_error()),
    }
}

fn encode_tail(kind: &ParamKind, value: &Value) -> Result<Vec<u8>, GatewayError> {
    let shape_error = || {
        GatewayError::invalid_argument(format!("value does not match ABI type {kind}"))
    };
    match (kind, value) {
        (ParamKind::Bytes, Value::Bytes(b)) => Ok(length_prefixed(b)),
        (ParamKind::String, Value::String(s)) => Ok(length_prefixed(s.as_bytes())),
        (ParamKind::Array(inner), Value::Array(items)) => {
            let mut out = usize_word(items.len()).to_vec();
            let kinds = vec![(**inner).clone(); items.len()];
            out.extend(encode_values(&kinds, items)?);
            Ok(out)
        }
        (ParamKind::FixedArray(inner, n), Value::Array(items)) if items.len() == *n => {
            let kinds = vec![(**inner).clone(); *n];
            encode_values(&kinds, items)
        }
        (ParamKind::Tuple(kinds), Value::Tuple(items)) => encode_values(kinds, items),
        _ => Err(shape_error()),
    }
}

fn length_prefixed(data: &[u8]) -> Vec<u8> {
    let mut out = usize_word(data.len()).to_vec();
    out.extend_from_slice(data);
    let padding = (WORD - data.len() % WORD) % WORD;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

fn u256_word(v: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    v.to_big_endian(&mut word);
    word
}

fn usize_word(v: usize) -> [u8; WORD] {
    u256_word(U256::from(v))
}

/// Decode one frame of values. `data` must be a complete frame; offsets are
/// frame-relative per the standard layout.
pub fn decode_values(kinds: &[ParamKind], data: &[u8]) -> Result<Vec<Value>, GatewayError> {
    decode_frame(kinds, data, 0)
}

fn decode_frame(kinds: &[ParamKind], frame: &[u8], abs: usize) -> Result<Vec<Value>, GatewayError> {
    let mut values = Vec::with_capacity(kinds.len());
    let mut cursor = 0usize;
    for kind in kinds {
        if kind.is_dynamic() {
            let offset = read_usize(frame, cursor, abs)?;
            if offset > frame.len() {
                return Err(GatewayError::decode(
                    abs + cursor,
                    format!("tail offset {offset} beyond frame of {} bytes", frame.len()),
                ));
            }
            values.push(decode_tail(kind, &frame[offset..], abs + offset)?);
            cursor += WORD;
        } else {
            values.push(decode_static(kind, frame, &mut cursor, abs)?);
        }
    }
    Ok(values)
}

fn decode_static(
    kind: &ParamKind,
    frame: &[u8],
    cursor: &mut usize,
    abs: usize,
) -> Result<Value, GatewayError> {
    match kind {
        ParamKind::FixedArray(inner, n) => {
            let mut items = Vec::with_capacity(*n);
            for _ in 0..*n {
                items.push(decode_static(inner, frame, cursor, abs)?);
            }
            Ok(Value::Array(items))
        }
        ParamKind::Tuple(kinds) => {
            let mut items = Vec::with_capacity(kinds.len());
            for k in kinds {
                items.push(decode_static(k, frame, cursor, abs)?);
            }
            Ok(Value::Tuple(items))
        }
        _ => {
            let at = *cursor;
            let word = read_word(frame, at, abs)?;
            *cursor += WORD;
            decode_word(kind, word, abs + at)
        }
    }
}

fn decode_word(kind: &ParamKind, word: &[u8], abs: usize) -> Result<Value, GatewayError> {
    match kind {
        ParamKind::Uint(w) => {
            let pad = WORD - w / 8;
            if word[..pad].iter().any(|b| *b != 0) {
                return Err(GatewayError::decode(
                    abs,
                    format!("nonzero padding bytes for uint{w}"),
                ));
            }
            Ok(Value::Uint(U256::from_big_endian(word), *w))
        }
        ParamKind::Int(w) => {
            let raw = U256::from_big_endian(word);
            let v = I256::from_raw(raw);
            if !int_fits(v, *w) {
                return Err(GatewayError::decode(
                    abs,
                    format!("improper sign extension for int{w}"),
                ));
            }
            Ok(Value::Int(v, *w))
        }
        ParamKind::Address => {
            if word[..12].iter().any(|b| *b != 0) {
                return Err(GatewayError::decode(abs, "nonzero padding bytes for address"));
            }
            Ok(Value::Address(Address::from_slice(&word[12..])))
        }
        ParamKind::Bool => {
            if word[..31].iter().any(|b| *b != 0) || word[31] > 1 {
                return Err(GatewayError::decode(abs, "boolean word is not 0 or 1"));
            }
            Ok(Value::Bool(word[31] == 1))
        }
        ParamKind::FixedBytes(n) => {
            if word[*n..].iter().any(|b| *b != 0) {
                return Err(GatewayError::decode(
                    abs,
                    format!("nonzero padding bytes for bytes{n}"),
                ));
            }
            Ok(Value::FixedBytes(word[..*n].to_vec()))
        }
        other => Err(GatewayError::decode(
            abs,
            format!("type {other} cannot be decoded from a single word"),
        )),
    }
}

fn decode_tail(kind: &ParamKind, tail: &[u8], abs: usize) -> Result<Value, GatewayError> {
    match kind {
        ParamKind::Bytes | ParamKind::String => {
            let len = read_usize(tail, 0, abs)?;
            if WORD + len > tail.len() {
                return Err(GatewayError::decode(
                    abs + WORD,
                    format!("declared length {len} exceeds remaining {} bytes", tail.len() - WORD),
                ));
            }
            let data = &tail[WORD..WORD + len];
            if matches!(kind, ParamKind::String) {
                let s = std::str::from_utf8(data).map_err(|e| {
                    GatewayError::decode(
                        abs + WORD + e.valid_up_to(),
                        "string payload is not valid UTF-8",
                    )
                })?;
                Ok(Value::String(s.to_string()))
            } else {
                Ok(Value::Bytes(data.to_vec()))
            }
        }
        ParamKind::Array(inner) => {
            let len = read_usize(tail, 0, abs)?;
            // Each element occupies at least one head word; reject lengths
            // the payload cannot possibly hold.
            if len > tail.len().saturating_sub(WORD) / WORD {
                return Err(GatewayError::decode(
                    abs,
                    format!("declared array length {len} exceeds remaining payload"),
                ));
            }
            let kinds = vec![(**inner).clone(); len];
            let items = decode_frame(&kinds, &tail[WORD..], abs + WORD)?;
            Ok(Value::Array(items))
        }
        ParamKind::FixedArray(inner, n) => {
            let kinds = vec![(**inner).clone(); *n];
            let items = decode_frame(&kinds, tail, abs)?;
            Ok(Value::Array(items))
        }
        ParamKind::Tuple(kinds) => {
            let items = decode_frame(kinds, tail, abs)?;
            Ok(Value::Tuple(items))
        }
        other => Err(GatewayError::decode(abs, format!("type {other} has no tail encoding"))),
    }
}

fn read_word<'a>(frame: &'a [u8], pos: usize, abs: usize) -> Result<&'a [u8], GatewayError> {
    if pos + WORD > frame.len() {
        return Err(GatewayError::decode(
            abs + pos,
            format!("truncated word: need 32 bytes, {} remain", frame.len().saturating_sub(pos)),
        ));
    }
    Ok(&frame[pos..pos + WORD])
}

fn read_usize(frame: &[u8], pos: usize, abs: usize) -> Result<usize, GatewayError> {
    let word = read_word(frame, pos, abs)?;
    let v = U256::from_big_endian(word);
    if v > U256::from(u32::MAX) {
        return Err(GatewayError::decode(
            abs + pos,
            format!("offset or length {v} is implausibly large"),
        ));
    }
    Ok(v.as_usize())
}
