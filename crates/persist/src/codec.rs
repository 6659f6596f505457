//! String forms used at the persistence boundary.

use buildworld_common::{Location, OccupantId, Profile};
use buildworld_kernel::SpawnPoint;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("expected {expected} fields, found {found} in {input:?}")]
    WrongArity {
        expected: usize,
        found: usize,
        input: String,
    },
    #[error("invalid number {0:?}")]
    Number(String),
    #[error("invalid identity {0:?}")]
    Identity(String),
}

/// `x;y;z;yaw;pitch`
pub fn encode_location(loc: &Location) -> String {
    format!(
        "{};{};{};{};{}",
        loc.position.x, loc.position.y, loc.position.z, loc.yaw, loc.pitch
    )
}

pub fn decode_location(input: &str) -> Result<Location, CodecError> {
    let parts: Vec<&str> = input.split(';').collect();
    location_from_parts(&parts, input)
}

/// `world:x:y:z:yaw:pitch`
pub fn encode_spawn_point(spawn: &SpawnPoint) -> String {
    let loc = &spawn.location;
    format!(
        "{}:{}:{}:{}:{}:{}",
        spawn.world, loc.position.x, loc.position.y, loc.position.z, loc.yaw, loc.pitch
    )
}

pub fn decode_spawn_point(input: &str) -> Result<SpawnPoint, CodecError> {
    let parts: Vec<&str> = input.trim().split(':').collect();
    if parts.len() != 6 {
        return Err(CodecError::WrongArity {
            expected: 6,
            found: parts.len(),
            input: input.to_string(),
        });
    }
    let location = location_from_parts(&parts[1..], input)?;
    Ok(SpawnPoint::new(parts[0], location))
}

/// `uuid,name;uuid,name`. Backslashes and separators inside a name are
/// escaped with a backslash.
pub fn encode_builders(builders: &[Profile]) -> String {
    builders
        .iter()
        .map(|b| format!("{},{}", b.id, escape(&b.name)))
        .collect::<Vec<_>>()
        .join(";")
}

pub fn decode_builders(input: &str) -> Result<Vec<Profile>, CodecError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_unescaped(input, ';')
        .into_iter()
        .map(|entry| {
            let (id, name) = entry.split_once(',').ok_or_else(|| CodecError::WrongArity {
                expected: 2,
                found: 1,
                input: entry.to_string(),
            })?;
            Ok(Profile::new(decode_identity(id)?, unescape(name)))
        })
        .collect()
}

fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '\\' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Split on `separator` where it is not preceded by an escaping backslash.
fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == separator => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

pub fn decode_identity(input: &str) -> Result<OccupantId, CodecError> {
    Uuid::parse_str(input.trim())
        .map(OccupantId)
        .map_err(|_| CodecError::Identity(input.to_string()))
}

fn location_from_parts(parts: &[&str], input: &str) -> Result<Location, CodecError> {
    if parts.len() != 5 {
        return Err(CodecError::WrongArity {
            expected: 5,
            found: parts.len(),
            input: input.to_string(),
        });
    }
    let coord = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| CodecError::Number(s.to_string()))
    };
    let angle = |s: &str| {
        s.trim()
            .parse::<f32>()
            .map_err(|_| CodecError::Number(s.to_string()))
    };
    Ok(Location::new(
        coord(parts[0])?,
        coord(parts[1])?,
        coord(parts[2])?,
        angle(parts[3])?,
        angle(parts[4])?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_string_form() {
        let loc = decode_location("10;65;10;90;0").unwrap();
        assert_eq!(loc, Location::new(10.0, 65.0, 10.0, 90.0, 0.0));
        assert_eq!(encode_location(&loc), "10;65;10;90;0");
    }

    #[test]
    fn fractional_location_survives() {
        let loc = Location::new(-3.5, 70.25, 12.75, -45.5, 12.0);
        assert_eq!(decode_location(&encode_location(&loc)).unwrap(), loc);
    }

    #[test]
    fn malformed_location_is_rejected() {
        assert!(matches!(
            decode_location("1;2;3"),
            Err(CodecError::WrongArity { expected: 5, found: 3, .. })
        ));
        assert!(matches!(decode_location("1;2;x;0;0"), Err(CodecError::Number(_))));
    }

    #[test]
    fn spawn_point_string_form() {
        let spawn = decode_spawn_point("hub:0.5:65:0.5:180:0").unwrap();
        assert_eq!(spawn.world, "hub");
        assert_eq!(spawn.location, Location::new(0.5, 65.0, 0.5, 180.0, 0.0));
        assert_eq!(encode_spawn_point(&spawn), "hub:0.5:65:0.5:180:0");
        assert!(decode_spawn_point("hub:1:2:3").is_err());
    }

    #[test]
    fn builders_string_form() {
        let a = Profile::new(OccupantId::new(), "alice");
        let b = Profile::new(OccupantId::new(), "bob");
        let encoded = encode_builders(&[a.clone(), b.clone()]);
        assert_eq!(decode_builders(&encoded).unwrap(), vec![a, b]);
        assert!(decode_builders("").unwrap().is_empty());
    }

    #[test]
    fn builder_names_with_separators_survive() {
        let builders = vec![
            Profile::new(OccupantId::new(), "a,b"),
            Profile::new(OccupantId::new(), "semi;colon"),
            Profile::new(OccupantId::new(), "back\\slash"),
            Profile::new(OccupantId::new(), "trailing\\"),
        ];
        let encoded = encode_builders(&builders);
        assert_eq!(decode_builders(&encoded).unwrap(), builders);
    }

    #[test]
    fn unescaped_builders_decode_as_before() {
        let id = OccupantId::new();
        let decoded = decode_builders(&format!("{id},alice")).unwrap();
        assert_eq!(decoded, vec![Profile::new(id, "alice")]);
    }

    #[test]
    fn builder_with_bad_identity_is_rejected() {
        assert!(matches!(
            decode_builders("not-a-uuid,alice"),
            Err(CodecError::Identity(_))
        ));
        assert!(decode_builders("missing-comma").is_err());
    }
}
