//! Lexical environments
//!
//! An [`Environment`] is a shared handle to one frame of a chain. Every binding
//! lives in its own cell so that `set!`, redefinition and the recursive
//! knot-tying of `define` and `letrec` update storage that closures and child
//! frames already hold. Cloning an `Environment` clones the handle, not the frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::is_valid_variable_name;
use crate::expr::Expr;

type Cell = Rc<RefCell<Expr>>;

struct Frame {
    bindings: RefCell<HashMap<String, Cell>>,
    parent: Option<Environment>,
}

/// Shared reference to a frame and, through it, its ancestors
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

fn check_name(name: &str) -> Result<(), Error> {
    if is_valid_variable_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidVariableName(name.to_owned()))
    }
}

impl Environment {
    /// Create a new root environment
    pub fn new() -> Self {
        Self::from_parts(HashMap::new(), None)
    }

    fn from_parts(bindings: HashMap<String, Cell>, parent: Option<Environment>) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(bindings),
            parent,
        }))
    }

    /// Create an empty child frame of this one
    pub fn with_parent(parent: &Environment) -> Self {
        Self::from_parts(HashMap::new(), Some(parent.clone()))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    fn lookup_cell(&self, name: &str) -> Option<Cell> {
        let mut frame = self;
        loop {
            if let Some(cell) = frame.0.bindings.borrow().get(name) {
                return Some(Rc::clone(cell));
            }
            frame = frame.parent()?;
        }
    }

    /// Look a name up from this frame toward the root
    pub fn lookup(&self, name: &str) -> Option<Expr> {
        self.lookup_cell(name).map(|cell| cell.borrow().clone())
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.lookup_cell(name).is_some()
    }

    /// Bind `name` in a new child frame
    pub fn extend(&self, name: &str, value: Expr) -> Result<Environment, Error> {
        self.extend_all([(name.to_owned(), value)])
    }

    /// Bind every pair in a single new child frame
    ///
    /// A later pair with the same name replaces an earlier one; callers that
    /// must reject duplicates check before calling.
    pub fn extend_all(
        &self,
        bindings: impl IntoIterator<Item = (String, Expr)>,
    ) -> Result<Environment, Error> {
        let mut frame = HashMap::new();
        for (name, value) in bindings {
            check_name(&name)?;
            frame.insert(name, Rc::new(RefCell::new(value)));
        }
        Ok(Self::from_parts(frame, Some(self.clone())))
    }

    /// Insert or overwrite a binding in this frame
    ///
    /// An existing binding keeps its cell, so closures that captured this frame
    /// observe the new value.
    pub fn define_in_place(&self, name: &str, value: Expr) -> Result<(), Error> {
        check_name(name)?;
        debug!(name, "define");
        let mut bindings = self.0.bindings.borrow_mut();
        match bindings.get(name) {
            Some(cell) => *cell.borrow_mut() = value,
            None => {
                bindings.insert(name.to_owned(), Rc::new(RefCell::new(value)));
            }
        }
        Ok(())
    }

    /// Overwrite the nearest existing binding of `name`
    pub fn assign(&self, name: &str, value: Expr) -> Result<(), Error> {
        let cell = self
            .lookup_cell(name)
            .ok_or_else(|| Error::UnboundAssignment(name.to_owned()))?;
        debug!(name, "assign");
        *cell.borrow_mut() = value;
        Ok(())
    }

    /// Whether both handles refer to the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// This frame's own bindings, sorted by name
    pub fn bindings(&self) -> Vec<(String, Expr)> {
        let mut all: Vec<_> = self
            .0
            .bindings
            .borrow()
            .iter()
            .map(|(name, cell)| (name.clone(), cell.borrow().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// Frames may be reachable from their own bindings, so only names are printed
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}
