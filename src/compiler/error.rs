use std::fmt;

/// Exit code returned when the front end rejects the input.
pub const SYNTACTIC_ERROR_CODE: i32 = 100;

/// Exit code returned when semantic analysis rejects the input.
pub const SEMANTIC_ERROR_CODE: i32 = 200;

/// Exit status a compiled program reports when a runtime trap fires
/// (overflow, division by zero, bad index, null dereference). The traps
/// call `exit(-1)`, which the OS truncates to 255.
pub const RUNTIME_ERROR_STATUS: i32 = 255;

/**
 Accumulates errors of one compilation phase instead of stopping at the
 first. A phase never terminates the process itself; it hands the filled
 list back to the driver, which prints the report and maps it to the
 phase's exit code.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorList<T> {
    errors: Vec<T>,
    exit_code: i32,
}

impl<T: fmt::Display> ErrorList<T> {
    pub fn new(exit_code: i32) -> Self {
        ErrorList {
            errors: vec![],
            exit_code,
        }
    }

    pub fn add(&mut self, error: T) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.errors.iter()
    }
}

impl<T: fmt::Display> fmt::Display for ErrorList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} error(s) detected during compilation! Exit code {} returned.",
            self.errors.len(),
            self.exit_code
        )?;
        for e in &self.errors {
            writeln!(f, "{}", e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_names_count_and_exit_code() {
        let mut errs: ErrorList<String> = ErrorList::new(SEMANTIC_ERROR_CODE);
        assert!(!errs.has_errors());
        errs.add("first".into());
        errs.add("second".into());

        let report = errs.to_string();
        assert!(report
            .starts_with("2 error(s) detected during compilation! Exit code 200 returned."));
        assert!(report.contains("first\n"));
        assert!(report.contains("second\n"));
    }
}
