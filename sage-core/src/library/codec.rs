//! On-disk encoding for one type bucket (spec §4.D, §6 "Template library
//! on disk"). The schema is a small self-describing container, not a
//! format mandate: a fixed header (`N`, `log_wave0`, `dln_wave`, record
//! count) followed by one variable-length record per template. All
//! multi-byte integers are little-endian.

use crate::error::{Error, Result};

const MAGIC: &[u8; 6] = b"SAGE1\0";

/// One on-disk template record, pre-decode/encode.
#[derive(Debug)]
pub struct BucketRecord {
    pub name: String,
    pub type_name: String,
    pub subtype: Option<String>,
    pub age_days: f32,
    pub quality_score: f32,
    pub flat_flux: Vec<f32>,
}

/// A decoded bucket file: the grid it was built on, plus its records.
#[derive(Debug)]
pub struct DecodedBucket {
    pub n: usize,
    pub log_wave0: f64,
    pub dln_wave: f64,
    pub records: Vec<BucketRecord>,
}

pub fn encode_bucket(n: usize, log_wave0: f64, dln_wave: f64, records: &[BucketRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(n as u32).to_le_bytes());
    buf.extend_from_slice(&log_wave0.to_le_bytes());
    buf.extend_from_slice(&dln_wave.to_le_bytes());
    buf.extend_from_slice(&(records.len() as u32).to_le_bytes());

    for rec in records {
        write_string(&mut buf, &rec.name);
        write_string(&mut buf, &rec.type_name);
        match &rec.subtype {
            Some(s) => {
                buf.push(1);
                write_string(&mut buf, s);
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&rec.age_days.to_le_bytes());
        buf.extend_from_slice(&rec.quality_score.to_le_bytes());
        for v in &rec.flat_flux {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
    buf
}

pub fn decode_bucket(bytes: &[u8]) -> Result<DecodedBucket> {
    if bytes.len() < MAGIC.len() + 4 + 8 + 8 + 4 || &bytes[0..6] != MAGIC {
        return Err(Error::BadInput("not a recognized template bucket".into()));
    }
    let mut cursor = MAGIC.len();
    let n = read_u32(bytes, &mut cursor)? as usize;
    let log_wave0 = read_f64(bytes, &mut cursor)?;
    let dln_wave = read_f64(bytes, &mut cursor)?;
    let record_count = read_u32(bytes, &mut cursor)?;

    let mut records = Vec::with_capacity(record_count as usize);
    for _ in 0..record_count {
        let name = read_string(bytes, &mut cursor)?;
        let type_name = read_string(bytes, &mut cursor)?;
        let has_subtype = read_u8(bytes, &mut cursor)?;
        let subtype = if has_subtype != 0 {
            Some(read_string(bytes, &mut cursor)?)
        } else {
            None
        };
        let age_days = read_f32(bytes, &mut cursor)?;
        let quality_score = read_f32(bytes, &mut cursor)?;
        let mut flat_flux = Vec::with_capacity(n);
        for _ in 0..n {
            flat_flux.push(read_f32(bytes, &mut cursor)?);
        }
        records.push(BucketRecord { name, type_name, subtype, age_days, quality_score, flat_flux });
    }

    Ok(DecodedBucket { n, log_wave0, dln_wave, records })
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u16(bytes, cursor)? as usize;
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or_else(|| Error::BadInput("truncated template bucket".into()))?;
    *cursor += len;
    String::from_utf8(slice.to_vec()).map_err(|_| Error::BadInput("non-utf8 string in template bucket".into()))
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    let v = *bytes.get(*cursor).ok_or_else(|| Error::BadInput("truncated template bucket".into()))?;
    *cursor += 1;
    Ok(v)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    let slice = bytes
        .get(*cursor..*cursor + 2)
        .ok_or_else(|| Error::BadInput("truncated template bucket".into()))?;
    *cursor += 2;
    Ok(u16::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = bytes
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| Error::BadInput("truncated template bucket".into()))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_f32(bytes: &[u8], cursor: &mut usize) -> Result<f32> {
    let slice = bytes
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| Error::BadInput("truncated template bucket".into()))?;
    *cursor += 4;
    Ok(f32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_f64(bytes: &[u8], cursor: &mut usize) -> Result<f64> {
    let slice = bytes
        .get(*cursor..*cursor + 8)
        .ok_or_else(|| Error::BadInput("truncated template bucket".into()))?;
    *cursor += 8;
    Ok(f64::from_le_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let records = vec![
            BucketRecord {
                name: "sn1999aa".into(),
                type_name: "Ia".into(),
                subtype: Some("91T".into()),
                age_days: 3.5,
                quality_score: 0.9,
                flat_flux: vec![0.0, 1.0, -1.0, 0.25],
            },
            BucketRecord {
                name: "sn1994d".into(),
                type_name: "Ia".into(),
                subtype: None,
                age_days: -2.0,
                quality_score: 1.0,
                flat_flux: vec![0.1, 0.2, 0.3, 0.4],
            },
        ];
        let bytes = encode_bucket(4, 8.28, 0.002, &records);
        let decoded = decode_bucket(&bytes).unwrap();
        assert_eq!(decoded.n, 4);
        assert!((decoded.log_wave0 - 8.28).abs() < 1e-12);
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records[0].name, "sn1999aa");
        assert_eq!(decoded.records[0].subtype.as_deref(), Some("91T"));
        assert_eq!(decoded.records[1].subtype, None);
        assert_eq!(decoded.records[1].flat_flux, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let err = decode_bucket(b"not a template bucket at all").unwrap_err();
        assert!(matches!(err, Error::BadInput(_)));
    }

    #[test]
    fn test_truncated_bucket_is_rejected() {
        let records = vec![BucketRecord {
            name: "x".into(),
            type_name: "Ia".into(),
            subtype: None,
            age_days: 0.0,
            quality_score: 0.0,
            flat_flux: vec![0.0; 8],
        }];
        let mut bytes = encode_bucket(8, 8.0, 0.002, &records);
        bytes.truncate(bytes.len() - 4);
        assert!(decode_bucket(&bytes).is_err());
    }
}
