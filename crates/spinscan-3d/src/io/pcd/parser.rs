use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

use super::{check_extension, PcdError};
use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    offset: usize, // byte offset within a point
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize, // total bytes per point
    num_points: usize, // number of points
    width: Option<usize>,
    height: Option<usize>,
}

impl PcdLayout {
    fn get_field_offset(&self, name: &str) -> Result<usize, PcdError> {
        self.fields
            .get(name)
            .map(|f| f.offset)
            .ok_or(PcdError::UnsupportedProperty)
    }
}

/// Read a little-endian f32 from a byte buffer
#[inline]
fn read_f32(buf: &[u8], offset: usize) -> Result<f32, PcdError> {
    let slice = buf
        .get(offset..offset + 4)
        .ok_or(PcdError::UnsupportedProperty)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(slice);
    Ok(f32::from_le_bytes(bytes))
}

fn parse_usize(token: Option<&str>) -> Result<usize, PcdError> {
    token
        .ok_or(PcdError::UnsupportedProperty)?
        .parse::<usize>()
        .map_err(|_| PcdError::UnsupportedProperty)
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut points = None;
    let mut width = None;
    let mut height = None;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();

        if line.starts_with("DATA") {
            if line != "DATA binary" {
                return Err(PcdError::UnsupportedProperty);
            }
            break;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("SIZE") => {
                sizes = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::UnsupportedProperty))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::UnsupportedProperty))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("COUNT") => {
                counts = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::UnsupportedProperty))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("WIDTH") => width = Some(parse_usize(it.next())?),
            Some("HEIGHT") => height = Some(parse_usize(it.next())?),
            Some("POINTS") => points = Some(parse_usize(it.next())?),
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            _ => {}
        }
    }

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::UnsupportedProperty);
    }

    // POINTS may be omitted, in which case it is WIDTH * HEIGHT
    let num_points = match (points, width, height) {
        (Some(n), _, _) => n,
        (None, Some(w), Some(h)) => w.checked_mul(h).ok_or(PcdError::MalformedHeader)?,
        _ => return Err(PcdError::MalformedHeader),
    };

    // Compute byte offsets for each field
    let mut offset = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        // COUNT defaults to 1 when omitted
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];

        if matches!(name.as_str(), "x" | "y" | "z") && !(size == 4 && count == 1 && types[i] == 'F')
        {
            return Err(PcdError::UnsupportedProperty);
        }

        let field_bytes = size.checked_mul(count).ok_or(PcdError::MalformedHeader)?;

        let field = PcdField { offset };

        offset = offset
            .checked_add(field_bytes)
            .ok_or(PcdError::MalformedHeader)?;

        if offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader);
        }

        if fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::MalformedHeader);
        }
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points,
        width,
        height,
    })
}

/// Read a binary PCD file.
///
/// Only the `x`, `y` and `z` fields are read; other fields are skipped. When
/// the header declares a `WIDTH x HEIGHT` grid with `HEIGHT > 1` the returned
/// cloud is organized, so NaN placeholders keep their grid position.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
pub fn read_pcd_binary(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    check_extension(path.as_ref())?;

    // Open file
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let layout = parse_pcd_layout(&mut reader)?;

    if layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    // Required fields
    let fx = layout.get_field_offset("x")?;
    let fy = layout.get_field_offset("y")?;
    let fz = layout.get_field_offset("z")?;

    if layout.point_step == 0 || layout.point_step > MAX_POINT_STEP {
        return Err(PcdError::MalformedHeader);
    }

    let mut buffer = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.num_points);

    // Read binary points
    for _ in 0..layout.num_points {
        reader.read_exact(&mut buffer)?;

        let x = read_f32(&buffer, fx)?;
        let y = read_f32(&buffer, fy)?;
        let z = read_f32(&buffer, fz)?;
        points.push([x as f64, y as f64, z as f64]);
    }

    match (layout.width, layout.height) {
        (Some(width), Some(height)) if height > 1 => {
            PointCloud::new_organized(points, width, height).map_err(|_| PcdError::MalformedHeader)
        }
        _ => Ok(PointCloud::new(points)),
    }
}
