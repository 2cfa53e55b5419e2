//! Causal dependency file: participant count on the first line, then one
//! `i d1 d2 ... dk` line per participant.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::ValidationError;
use crate::participant::ParticipantId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    processes: u32,
    deps: BTreeMap<ParticipantId, Vec<ParticipantId>>,
}

impl DependencyMap {
    pub fn new(processes: u32) -> Self {
        Self {
            processes,
            deps: BTreeMap::new(),
        }
    }

    pub fn processes(&self) -> u32 {
        self.processes
    }

    /// Replace the dependency set of `id`.
    pub fn set(&mut self, id: ParticipantId, deps: Vec<ParticipantId>) {
        self.deps.insert(id, deps);
    }

    /// Declared dependencies of `id`. Empty if none were declared.
    pub fn of(&self, id: ParticipantId) -> &[ParticipantId] {
        self.deps.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, &[ParticipantId])> {
        self.deps.iter().map(|(id, deps)| (*id, deps.as_slice()))
    }

    pub fn parse(contents: &str) -> Result<Self, ValidationError> {
        let mut lines = contents
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| ValidationError::Dependencies("empty dependency file".into()))?;
        let processes: u32 = header.trim().parse().map_err(|_| {
            ValidationError::Dependencies(format!("invalid participant count `{}`", header.trim()))
        })?;

        let mut map = Self::new(processes);
        for (index, line) in lines {
            let ids = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<u32>().map(ParticipantId).map_err(|_| {
                        ValidationError::Dependencies(format!(
                            "line {}: invalid participant id `{}`",
                            index + 1,
                            tok
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let Some((&owner, deps)) = ids.split_first() else {
                continue;
            };
            for id in ids.iter() {
                if !id.in_range(processes) {
                    return Err(ValidationError::Dependencies(format!(
                        "line {}: participant {} outside 1..={}",
                        index + 1,
                        id,
                        processes
                    )));
                }
            }
            if map.deps.insert(owner, deps.to_vec()).is_some() {
                return Err(ValidationError::Dependencies(format!(
                    "line {}: participant {} listed twice",
                    index + 1,
                    owner
                )));
            }
        }
        Ok(map)
    }

    pub fn read(path: &Path) -> Result<Self, ValidationError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ValidationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// The `i d1 ... dk` lines without the header.
    pub fn body(&self) -> String {
        let mut out = String::new();
        for (id, deps) in &self.deps {
            let _ = write!(out, "{}", id);
            for dep in deps {
                let _ = write!(out, " {}", dep);
            }
            out.push('\n');
        }
        out
    }

    pub fn render(&self) -> String {
        format!("{}\n{}", self.processes, self.body())
    }

    pub fn write(&self, path: &Path) -> Result<(), ValidationError> {
        std::fs::write(path, self.render()).map_err(|source| ValidationError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
