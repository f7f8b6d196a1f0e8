//! Extended XYZ training data
//!
//! Each frame is an atom count line, a comment line of `key=value` pairs and
//! one line per atom:
//!
//! ```text
//! 2
//! energy=-31.2 Properties=species:S:1:pos:R:3:forces:R:3
//! O  0.0 0.0 0.0   0.10 0.00 -0.20
//! H  0.0 0.0 0.96 -0.10 0.00  0.20
//! ```
//!
//! Values may be quoted. Species come from a `species:S:1` column (chemical
//! symbols) or a `Z:I:1` column (atomic numbers); forces from an optional
//! `forces:R:3` column. Positions are not read: they only matter to the
//! representation, which is computed elsewhere.

use crate::core::{GapError, Result, Species, Structure};
use crate::data::elements::atomic_number;
use crate::fit::stack_structure_forces;
use log::{debug, info};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

/// Properties assumed when a frame does not declare any
const DEFAULT_PROPERTIES: &str = "species:S:1:pos:R:3";

/// Structures with their reference total energies
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    structures: Vec<Structure>,
    energies: Array1<f64>,
}

impl TrainingSet {
    pub fn new(structures: Vec<Structure>, energies: Array1<f64>) -> Result<Self> {
        if structures.len() != energies.len() {
            return Err(GapError::dimension("energies", structures.len(), energies.len()));
        }
        Ok(Self {
            structures,
            energies,
        })
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn energies(&self) -> &Array1<f64> {
        &self.energies
    }

    /// Forces of every atom stacked P x 3, or `None` without forces
    pub fn stacked_forces(&self) -> Result<Option<Array2<f64>>> {
        stack_structure_forces(&self.structures)
    }
}

/// Reader for extended XYZ files
#[derive(Debug, Clone)]
pub struct ExtXyzReader {
    energy_key: String,
}

impl Default for ExtXyzReader {
    fn default() -> Self {
        Self {
            energy_key: "energy".to_string(),
        }
    }
}

struct Frame {
    structure: Structure,
    energy: Option<f64>,
    comment_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SpeciesColumn {
    Symbol(usize),
    Number(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    species: SpeciesColumn,
    forces: Option<usize>,
    width: usize,
}

impl ExtXyzReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the total energy from `key` instead of `energy`
    pub fn with_energy_key(mut self, key: impl Into<String>) -> Self {
        self.energy_key = key.into();
        self
    }

    pub fn energy_key(&self) -> &str {
        &self.energy_key
    }

    /// Load every frame of an extended XYZ file
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<TrainingSet> {
        let path = path.as_ref();
        info!("Reading structures from: {path:?}");
        let file = File::open(path).map_err(GapError::IoError)?;
        self.read(BufReader::new(file))
    }

    /// Load every frame from a reader
    pub fn read<R: BufRead>(&self, reader: R) -> Result<TrainingSet> {
        let frames = self.read_frames(reader)?;
        let mut structures = Vec::with_capacity(frames.len());
        let mut energies = Vec::with_capacity(frames.len());
        for frame in frames {
            let energy = frame.energy.ok_or_else(|| {
                parse_error(frame.comment_line, format!("missing '{}' key", self.energy_key))
            })?;
            structures.push(frame.structure);
            energies.push(energy);
        }
        TrainingSet::new(structures, Array1::from(energies))
    }

    /// Load the structures of an extended XYZ file; energies are not required
    pub fn read_structures_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Structure>> {
        let path = path.as_ref();
        info!("Reading structures from: {path:?}");
        let file = File::open(path).map_err(GapError::IoError)?;
        self.read_structures(BufReader::new(file))
    }

    /// Load the structures from a reader; energies are not required
    pub fn read_structures<R: BufRead>(&self, reader: R) -> Result<Vec<Structure>> {
        Ok(self
            .read_frames(reader)?
            .into_iter()
            .map(|frame| frame.structure)
            .collect())
    }

    fn read_frames<R: BufRead>(&self, reader: R) -> Result<Vec<Frame>> {
        let lines: Vec<String> = reader
            .lines()
            .collect::<std::io::Result<_>>()
            .map_err(GapError::IoError)?;

        let mut frames = Vec::new();
        let mut cursor = 0;
        while cursor < lines.len() {
            if lines[cursor].trim().is_empty() {
                cursor += 1;
                continue;
            }
            frames.push(self.read_frame(&lines, &mut cursor)?);
        }

        if frames.is_empty() {
            return Err(GapError::EmptyDataset);
        }
        debug!("Read {} frames", frames.len());
        Ok(frames)
    }

    fn read_frame(&self, lines: &[String], cursor: &mut usize) -> Result<Frame> {
        let header_line = *cursor;
        let header = lines[header_line].trim();
        let n_atoms: usize = header
            .parse()
            .map_err(|_| parse_error(header_line, format!("expected atom count, found '{header}'")))?;
        if n_atoms == 0 {
            return Err(parse_error(header_line, "frame has no atoms"));
        }

        let comment_line = header_line + 1;
        let comment = lines
            .get(comment_line)
            .ok_or_else(|| parse_error(comment_line, "unexpected end of file, expected comment line"))?;
        let info = parse_key_values(comment).map_err(|e| parse_error(comment_line, e))?;

        let energy = match info.get(self.energy_key.as_str()) {
            Some(text) => Some(text.parse::<f64>().map_err(|_| {
                parse_error(comment_line, format!("invalid energy value: {text}"))
            })?),
            None => None,
        };

        let properties = info
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("properties"))
            .map_or(DEFAULT_PROPERTIES, |(_, value)| value.as_str());
        let columns = parse_properties(properties).map_err(|e| parse_error(comment_line, e))?;

        // The header count is untrusted; never allocate past the lines that exist
        let available = lines.len().saturating_sub(comment_line + 1);
        if n_atoms > available {
            return Err(parse_error(
                lines.len(),
                format!("unexpected end of file, expected {n_atoms} atoms, found {available}"),
            ));
        }

        let mut species = Vec::with_capacity(n_atoms);
        let mut forces = columns.forces.map(|_| Array2::<f64>::zeros((n_atoms, 3)));

        for atom in 0..n_atoms {
            let line_index = comment_line + 1 + atom;
            let line = lines.get(line_index).ok_or_else(|| {
                parse_error(
                    line_index,
                    format!("unexpected end of file, expected {n_atoms} atoms, found {atom}"),
                )
            })?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != columns.width {
                return Err(parse_error(
                    line_index,
                    format!("expected {} columns, found {}", columns.width, fields.len()),
                ));
            }
            species.push(parse_species(&fields, columns.species).map_err(|e| parse_error(line_index, e))?);

            if let (Some(start), Some(forces)) = (columns.forces, forces.as_mut()) {
                for c in 0..3 {
                    let text = fields[start + c];
                    forces[[atom, c]] = text
                        .parse()
                        .map_err(|_| parse_error(line_index, format!("invalid force value: {text}")))?;
                }
            }
        }
        *cursor = comment_line + 1 + n_atoms;

        let structure = Structure::new(species);
        let structure = match forces {
            Some(forces) => structure.with_forces(forces)?,
            None => structure,
        };
        Ok(Frame {
            structure,
            energy,
            comment_line,
        })
    }
}

fn parse_error(line_index: usize, message: impl std::fmt::Display) -> GapError {
    GapError::ParseError(format!("Error parsing line {}: {}", line_index + 1, message))
}

fn parse_species(fields: &[&str], column: SpeciesColumn) -> std::result::Result<Species, String> {
    match column {
        SpeciesColumn::Symbol(i) => {
            atomic_number(fields[i]).ok_or_else(|| format!("unknown chemical symbol: {}", fields[i]))
        }
        SpeciesColumn::Number(i) => match fields[i].parse::<Species>() {
            Ok(z) if z > 0 => Ok(z),
            _ => Err(format!("invalid atomic number: {}", fields[i])),
        },
    }
}

/// Parse `name:type:width` triplets into the columns the reader needs
fn parse_properties(spec: &str) -> std::result::Result<Columns, String> {
    let fields: Vec<&str> = spec.split(':').collect();
    if fields.len() % 3 != 0 {
        return Err(format!("malformed Properties: {spec}"));
    }

    let mut symbols = None;
    let mut numbers = None;
    let mut forces = None;
    let mut width = 0;
    for property in fields.chunks(3) {
        let (name, kind) = (property[0], property[1]);
        let n: usize = property[2]
            .parse()
            .map_err(|_| format!("invalid width for property {name}: {}", property[2]))?;
        match (name, kind, n) {
            ("species", "S", 1) => symbols = Some(width),
            ("Z", "I", 1) => numbers = Some(width),
            ("forces", "R", 3) => forces = Some(width),
            ("species" | "Z" | "forces", _, _) => {
                return Err(format!("unexpected layout for property {name}: {kind}:{n}"))
            }
            _ => {}
        }
        width += n;
    }

    let species = match (symbols, numbers) {
        (Some(i), _) => SpeciesColumn::Symbol(i),
        (None, Some(i)) => SpeciesColumn::Number(i),
        (None, None) => return Err("Properties has no species:S:1 or Z:I:1 column".to_string()),
    };
    Ok(Columns {
        species,
        forces,
        width,
    })
}

/// Split a comment line into `key=value` pairs; a bare key reads as `T`
fn parse_key_values(line: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut pairs = BTreeMap::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            return Ok(pairs);
        }
        let key = read_token(&mut chars, true)?;
        let value = if chars.peek() == Some(&'=') {
            chars.next();
            read_token(&mut chars, false)?
        } else {
            "T".to_string()
        };
        pairs.insert(key, value);
    }
}

fn read_token(chars: &mut Peekable<Chars<'_>>, is_key: bool) -> std::result::Result<String, String> {
    let mut token = String::new();
    if let Some(&quote) = chars.peek().filter(|&&c| c == '"' || c == '\'') {
        chars.next();
        for c in chars.by_ref() {
            if c == quote {
                return Ok(token);
            }
            token.push(c);
        }
        return Err("unterminated quoted value".to_string());
    }
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || (is_key && c == '=') {
            break;
        }
        token.push(c);
        chars.next();
    }
    if token.is_empty() {
        return Err(if is_key { "empty key" } else { "empty value" }.to_string());
    }
    Ok(token)
}
