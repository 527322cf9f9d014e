//! Module
//!
//! Defines the top-level module structure: an ordered collection of
//! uniquely named functions.

use serde::{Deserialize, Serialize};
use std::fmt;
use zir_common::ZirError;
use crate::Function;

/// IR Module - represents a complete compilation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a function; names are unique within a module
    pub fn add_function(&mut self, function: Function) -> Result<(), ZirError> {
        if function.name().is_empty() {
            return Err(ZirError::EmptyName("function"));
        }
        if self.get_function(function.name()).is_some() {
            return Err(ZirError::DuplicateFunction(function.name().to_string()));
        }
        self.functions.push(function);
        Ok(())
    }

    /// Functions in insertion order
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Mutable access for the optimizer's own passes
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.iter_mut()
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name() == name)
    }

    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        let pos = self.functions.iter().position(|f| f.name() == name)?;
        Some(self.functions.remove(pos))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 { writeln!(f)?; }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
