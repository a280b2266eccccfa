/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fmt::Display;
use std::io::ErrorKind;
use std::num::TryFromIntError;

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
#[non_exhaustive]
/// Well-defined errors for bad things that are expected to happen as part of decomposing or recoding
pub enum ExitCode {
    /// Assertion failure, which indicates probably indicated a bug in the library.
    AssertionFailure = 1,

    /// The block encoder or the MCU iterator failed in the middle of a scan.
    CodingError = 2,

    /// The JPEG file is too short to be a valid JPEG file.
    ShortRead = 3,

    /// The coefficients in the JPEG file are out of range specified by the JPEG standard.
    CoefficientOutOfRange = 6,

    /// The JPEG file is progressive, which cannot be recoded as baseline.
    ProgressiveUnsupported = 8,

    /// The JPEG file has a sampling factor that is not supported by the library.
    SamplingBeyondTwoUnsupported = 10,

    /// The container file is a version that is not supported by the library.
    VersionUnsupported = 13,

    /// An error was returned by an IO operation, for example if the output
    /// device was full.
    OsError = 33,

    /// The JPEG cannot be encoded due to a non-standard feature that is not supported by the library.
    UnsupportedJpeg = 42,

    /// The JPEG file has invalid reset codes in the stream
    InvalidResetCode = 44,

    /// The JPEG uses inconsistent padding, which is not supported by the library.
    InvalidPadding = 45,

    /// The container file is not a valid container file.
    BadContainerFile = 102,

    /// error occured while casting an integer to a smaller type, most likely
    /// means that the JPEG contains invalid data
    IntegerCastOverflow = 1000,

    /// We verified against the original JPEG file but the regenerated length was different
    VerificationLengthMismatch = 1004,

    /// We verified against the original JPEG file but the content was different (but same length)
    VerificationContentMismatch = 1005,

    /// Caller passed in invalid parameters
    SyntaxError = 1006,

    /// The file to be read was not found (only used by utility exe)
    FileNotFound = 1007,

    /// ran out of memory trying to allocate a buffer
    OutOfMemory = 2000,

    /// More memory or output was retained than the caller's size bound permits.
    MemoryBoundExceeded = 2001,
}

impl Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ExitCode {
    /// Converts the error code into an integer for use as a process exit status.
    pub fn as_integer_error_code(self) -> i32 {
        self as i32
    }
}

/// Since errors are rare and stop everything, we want them to be as lightweight as possible.
#[derive(Debug, Clone)]
struct RecodeErrorInternal {
    exit_code: ExitCode,
    message: String,
}

/// Standard error returned by the recoding library
#[derive(Debug, Clone)]
pub struct RecodeError {
    i: Box<RecodeErrorInternal>,
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RecodeError>;

impl Display for RecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}: {1}", self.i.exit_code, self.i.message)
    }
}

impl RecodeError {
    /// Creates a new RecodeError with the specified exit code and message.
    pub fn new(exit_code: ExitCode, message: impl AsRef<str>) -> RecodeError {
        RecodeError {
            i: Box::new(RecodeErrorInternal {
                exit_code,
                message: message.as_ref().to_owned(),
            }),
        }
    }

    /// Returns the numeric exit code of the error to clasify the error
    pub fn exit_code(&self) -> ExitCode {
        self.i.exit_code
    }

    /// Returns the message of the error, which is a human-readable description of the error.
    pub fn message(&self) -> &str {
        &self.i.message
    }

    /// Appends the caller's location to the message, building up a callstack
    /// as the error propagates.
    #[cold]
    #[inline(never)]
    #[track_caller]
    pub fn add_context(&mut self) {
        self.i
            .message
            .push_str(&format!("\n at {}", std::panic::Location::caller()));
    }
}

#[cold]
#[track_caller]
pub fn err_exit_code<T>(error_code: ExitCode, message: impl AsRef<str>) -> Result<T> {
    let mut e = RecodeError::new(error_code, message.as_ref());
    e.add_context();
    Err(e)
}

pub trait AddContext<T> {
    #[track_caller]
    fn context(self) -> Result<T>;
}

impl<T, E: Into<RecodeError>> AddContext<T> for core::result::Result<T, E> {
    #[track_caller]
    fn context(self) -> Result<T> {
        match self {
            Ok(x) => Ok(x),
            Err(e) => {
                let mut e = e.into();
                e.add_context();
                Err(e)
            }
        }
    }
}

impl std::error::Error for RecodeError {}

fn get_io_error_exit_code(e: &std::io::Error) -> ExitCode {
    if e.kind() == ErrorKind::UnexpectedEof {
        ExitCode::ShortRead
    } else {
        ExitCode::OsError
    }
}

impl From<TryFromIntError> for RecodeError {
    #[track_caller]
    fn from(e: TryFromIntError) -> Self {
        let mut e = RecodeError::new(ExitCode::IntegerCastOverflow, e.to_string());
        e.add_context();
        e
    }
}

/// translates std::io::Error into RecodeError
impl From<std::io::Error> for RecodeError {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        match e.downcast::<RecodeError>() {
            Ok(re) => re,
            Err(e) => {
                let mut e = RecodeError::new(get_io_error_exit_code(&e), e.to_string());
                e.add_context();
                e
            }
        }
    }
}

/// translates RecodeError into std::io::Error, which involves putting into a Box and using Other
impl From<RecodeError> for std::io::Error {
    fn from(e: RecodeError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

#[test]
fn test_error_translation() {
    // test wrapping inside an io error
    fn my_std_error() -> core::result::Result<(), std::io::Error> {
        Err(RecodeError::new(ExitCode::SyntaxError, "test error").into())
    }

    let e: RecodeError = my_std_error().unwrap_err().into();
    assert_eq!(e.exit_code(), ExitCode::SyntaxError);
    assert_eq!(e.message(), "test error");

    // an IO error should be translated into an OsError
    let e: RecodeError = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found").into();
    assert_eq!(e.exit_code(), ExitCode::OsError);

    let e: RecodeError =
        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated").into();
    assert_eq!(e.exit_code(), ExitCode::ShortRead);
}

#[test]
fn test_context_appends_location() {
    let r: Result<()> = err_exit_code(ExitCode::CodingError, "bad block");
    let e = r.context().unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::CodingError);
    assert!(e.message().starts_with("bad block"));
    assert_eq!(e.message().matches("\n at ").count(), 2);
}
