//! Map serialization.
//!
//! Two formats, both depth-first in octant order after a common header:
//!
//! ```text
//! header: magic[4] | pitch f64 LE
//!
//! binary ("IOMB"): root code u8 (0 empty, 1 free, 2 occupied, 3 inner)
//!                  per inner node: 2 bytes, 2 bits per child
//!                  00 unknown | 01 free leaf | 10 occupied leaf | 11 inner
//!
//! full ("IOMF"):   present u8, then per node: log_odds f32 LE | child mask u8
//! ```
//!
//! The binary format is lossy: leaves read back at the clamping bounds.

use std::io::{Read, Write};

use super::node::{Children, OcNode};
use super::occupancy::LogOddsModel;
use super::tree::VoxelOctree;
use crate::config::SensorModel;
use crate::constants::TREE_DEPTH;
use crate::error::{MapError, Result};

const BINARY_MAGIC: &[u8; 4] = b"IOMB";
const FULL_MAGIC: &[u8; 4] = b"IOMF";

const CODE_UNKNOWN: u8 = 0b00;
const CODE_FREE: u8 = 0b01;
const CODE_OCCUPIED: u8 = 0b10;
const CODE_INNER: u8 = 0b11;

fn write_header<W: Write>(writer: &mut W, magic: &[u8; 4], pitch: f64) -> Result<()> {
  writer.write_all(magic).map_err(MapError::Serialization)?;
  writer
    .write_all(&pitch.to_le_bytes())
    .map_err(MapError::Serialization)
}

fn read_header<R: Read>(reader: &mut R, magic: &[u8; 4]) -> Result<f64> {
  let mut found = [0u8; 4];
  reader.read_exact(&mut found).map_err(MapError::Serialization)?;
  if &found != magic {
    return Err(MapError::MalformedMap(format!(
      "expected magic {:?}, found {:?}",
      String::from_utf8_lossy(magic),
      String::from_utf8_lossy(&found)
    )));
  }
  let mut pitch = [0u8; 8];
  reader.read_exact(&mut pitch).map_err(MapError::Serialization)?;
  let pitch = f64::from_le_bytes(pitch);
  if !(pitch.is_finite() && pitch > 0.0) {
    return Err(MapError::MalformedMap(format!("invalid voxel pitch {}", pitch)));
  }
  Ok(pitch)
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
  let mut byte = [0u8; 1];
  reader.read_exact(&mut byte).map_err(MapError::Serialization)?;
  Ok(byte[0])
}

fn leaf_code(node: &OcNode) -> u8 {
  if node.has_children() {
    CODE_INNER
  } else if LogOddsModel::is_occupied(node.log_odds) {
    CODE_OCCUPIED
  } else {
    CODE_FREE
  }
}

fn leaf_from_code(code: u8, model: &LogOddsModel) -> OcNode {
  match code {
    CODE_OCCUPIED => OcNode::new(model.clamp_max),
    _ => OcNode::new(model.clamp_min),
  }
}

impl VoxelOctree {
  /// Write the thresholded map (occupied / free / unknown).
  pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<()> {
    write_header(writer, BINARY_MAGIC, self.pitch())?;
    let Some(root) = self.root() else {
      return writer.write_all(&[0]).map_err(MapError::Serialization);
    };
    let root_code = match leaf_code(root) {
      CODE_FREE => 1,
      CODE_OCCUPIED => 2,
      _ => 3,
    };
    writer.write_all(&[root_code]).map_err(MapError::Serialization)?;
    if root.has_children() {
      write_binary_node(writer, root)?;
    }
    Ok(())
  }

  /// Read a map written by [`VoxelOctree::write_binary`].
  pub fn read_binary<R: Read>(reader: &mut R, sensor_model: &SensorModel) -> Result<Self> {
    let pitch = read_header(reader, BINARY_MAGIC)?;
    let mut tree = VoxelOctree::new(pitch, sensor_model);
    let model = *tree.model();
    let root = match read_u8(reader)? {
      0 => None,
      1 => Some(Box::new(OcNode::new(model.clamp_min))),
      2 => Some(Box::new(OcNode::new(model.clamp_max))),
      3 => {
        let mut root = OcNode::default();
        read_binary_node(reader, &mut root, 0, &model)?;
        Some(Box::new(root))
      }
      code => {
        return Err(MapError::MalformedMap(format!("invalid root code {}", code)));
      }
    };
    tree.set_root(root);
    Ok(tree)
  }

  /// Write the map with full log-odds values.
  pub fn write_full<W: Write>(&self, writer: &mut W) -> Result<()> {
    write_header(writer, FULL_MAGIC, self.pitch())?;
    match self.root() {
      Some(root) => {
        writer.write_all(&[1]).map_err(MapError::Serialization)?;
        write_full_node(writer, root)
      }
      None => writer.write_all(&[0]).map_err(MapError::Serialization),
    }
  }

  /// Read a map written by [`VoxelOctree::write_full`].
  pub fn read_full<R: Read>(reader: &mut R, sensor_model: &SensorModel) -> Result<Self> {
    let pitch = read_header(reader, FULL_MAGIC)?;
    let mut tree = VoxelOctree::new(pitch, sensor_model);
    let root = match read_u8(reader)? {
      0 => None,
      1 => Some(Box::new(read_full_node(reader, 0)?)),
      flag => {
        return Err(MapError::MalformedMap(format!("invalid root flag {}", flag)));
      }
    };
    tree.set_root(root);
    Ok(tree)
  }
}

fn write_binary_node<W: Write>(writer: &mut W, node: &OcNode) -> Result<()> {
  let mut bits: u16 = 0;
  for octant in 0..8 {
    let code = node.child(octant).map_or(CODE_UNKNOWN, leaf_code);
    bits |= (code as u16) << (octant * 2);
  }
  writer
    .write_all(&bits.to_le_bytes())
    .map_err(MapError::Serialization)?;
  for octant in 0..8 {
    if let Some(child) = node.child(octant).filter(|child| child.has_children()) {
      write_binary_node(writer, child)?;
    }
  }
  Ok(())
}

fn read_binary_node<R: Read>(
  reader: &mut R,
  node: &mut OcNode,
  depth: u8,
  model: &LogOddsModel,
) -> Result<()> {
  if depth >= TREE_DEPTH {
    return Err(MapError::MalformedMap("inner node below finest depth".into()));
  }
  let mut bytes = [0u8; 2];
  reader.read_exact(&mut bytes).map_err(MapError::Serialization)?;
  let bits = u16::from_le_bytes(bytes);

  let mut children = Children::default();
  for (octant, slot) in children.iter_mut().enumerate() {
    let code = ((bits >> (octant * 2)) & 0b11) as u8;
    *slot = match code {
      CODE_UNKNOWN => None,
      CODE_INNER => {
        let mut child = OcNode::default();
        read_binary_node(reader, &mut child, depth + 1, model)?;
        Some(Box::new(child))
      }
      leaf => Some(Box::new(leaf_from_code(leaf, model))),
    };
  }
  if children.iter().all(Option::is_none) {
    return Err(MapError::MalformedMap("inner node without children".into()));
  }
  node.children = Some(Box::new(children));
  node.update_inner_occupancy();
  Ok(())
}

fn write_full_node<W: Write>(writer: &mut W, node: &OcNode) -> Result<()> {
  let mut mask = 0u8;
  for octant in 0..8 {
    if node.child(octant).is_some() {
      mask |= 1 << octant;
    }
  }
  writer
    .write_all(&node.log_odds.to_le_bytes())
    .map_err(MapError::Serialization)?;
  writer.write_all(&[mask]).map_err(MapError::Serialization)?;
  for octant in 0..8 {
    if let Some(child) = node.child(octant) {
      write_full_node(writer, child)?;
    }
  }
  Ok(())
}

fn read_full_node<R: Read>(reader: &mut R, depth: u8) -> Result<OcNode> {
  let mut value = [0u8; 4];
  reader.read_exact(&mut value).map_err(MapError::Serialization)?;
  let log_odds = f32::from_le_bytes(value);
  if !log_odds.is_finite() {
    return Err(MapError::MalformedMap(format!("non-finite log-odds at depth {}", depth)));
  }
  let mask = read_u8(reader)?;
  let mut node = OcNode::new(log_odds);
  if mask == 0 {
    return Ok(node);
  }
  if depth >= TREE_DEPTH {
    return Err(MapError::MalformedMap("children below finest depth".into()));
  }
  let mut children = Children::default();
  for (octant, slot) in children.iter_mut().enumerate() {
    if mask & (1 << octant) != 0 {
      *slot = Some(Box::new(read_full_node(reader, depth + 1)?));
    }
  }
  node.children = Some(Box::new(children));
  Ok(node)
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
