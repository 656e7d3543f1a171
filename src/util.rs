//! Defines the `Error` type for the lauritzen library

use std::error::Error;
use std::fmt;
use std::result;

pub type Result<T> = result::Result<T, LauritzenError>;

#[derive(Clone, Debug)]
pub enum LauritzenError {

    /// Represents an incomplete assignment where a complete assignment was required.
    IncompleteAssignment,

    /// Represents an error where a certain constraint on a scope was not satisfied
    InvalidScope,

    /// Represents an error where there was a parent variable expected, but not found
    MissingParent,

    /// Represents a variable that was present multiple times in a situation where it should only
    /// have been present once
    DuplicateVariable,

    /// Represents the situation when we expected a CPD but did not receive one
    NotACPD,

    /// Represents an attempt to initialize a variable with an incompatible Initialization
    InvalidInitialization,

    /// Represents a situation in which there was a non-positive probability provided
    NonPositiveProbability,

    /// A caller-supplied argument (strategy selector, evidence value, threshold) was rejected
    InvalidArgument(String),

    /// A requested target is not addressable: not in the moral graph and not covered by any
    /// clique under the current pruning
    UndefinedElement(String),

    /// The supplied hard and soft evidence is jointly impossible under the network: an
    /// unnormalized posterior summed to zero over its full domain
    IncompatibleEvidence,

    /// An internal invariant was violated. The engine that raised this must be considered
    /// unusable and discarded.
    Fatal(String),

    /// A general error with the given description
    General(String),

    /// An unknown error condition
    Unknown

}

impl Error for LauritzenError {

    fn description(&self) -> &str {
        match self {
            &LauritzenError::IncompleteAssignment => "Missing assignments to the required Variables",
            &LauritzenError::InvalidScope => "Provided scope did not satisfy constraints",
            &LauritzenError::MissingParent => "Missing a parent from the model",
            &LauritzenError::DuplicateVariable => "A variable was encountered twice",
            &LauritzenError::NotACPD => "Requires a Conditional Probability Distribution",
            &LauritzenError::InvalidInitialization => "An invalid initialization was provided",
            &LauritzenError::NonPositiveProbability => "Encountered a non-positive probability",
            &LauritzenError::InvalidArgument(ref err) => err.as_str(),
            &LauritzenError::UndefinedElement(ref err) => err.as_str(),
            &LauritzenError::IncompatibleEvidence => "The evidence is impossible under the network",
            &LauritzenError::Fatal(ref err) => err.as_str(),
            &LauritzenError::General(ref err) => err.as_str(),
            &LauritzenError::Unknown => "An unknown error occured"
        }
    }

    fn cause(&self) -> Option<&Error> {
        None
    }

}

impl fmt::Display for LauritzenError {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.description())
    }

}
