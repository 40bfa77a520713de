use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Enabled proposal set. Decoders and the text reader consult this to
    /// decide which productions are accepted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct Features: u32 {
        const MUTABLE_GLOBALS = 1 << 0;
        const SATURATING_FLOAT_TO_INT = 1 << 1;
        const SIGN_EXTENSION = 1 << 2;
        const SIMD = 1 << 3;
        const THREADS = 1 << 4;
        const EXCEPTIONS = 1 << 5;
        const BULK_MEMORY = 1 << 6;
        const REFERENCE_TYPES = 1 << 7;
        const FUNCTION_REFERENCES = 1 << 8;
        const TAIL_CALL = 1 << 9;
        const MULTI_VALUE = 1 << 10;
        const GC = 1 << 11;
    }
}

impl Default for Features {
    fn default() -> Self {
        Features::MUTABLE_GLOBALS
            | Features::SATURATING_FLOAT_TO_INT
            | Features::SIGN_EXTENSION
            | Features::MULTI_VALUE
    }
}

impl Features {
    pub fn none() -> Self {
        Features::empty()
    }

    pub fn with(self, flag: Features) -> Self {
        (self | flag).with_dependencies()
    }

    /// Enabling a proposal pulls in the proposals it builds on:
    /// gc -> function-references, function-references and exceptions ->
    /// reference-types, reference-types -> bulk-memory.
    pub fn with_dependencies(mut self) -> Self {
        if self.contains(Features::GC) {
            self |= Features::FUNCTION_REFERENCES;
        }
        if self.intersects(Features::FUNCTION_REFERENCES | Features::EXCEPTIONS) {
            self |= Features::REFERENCE_TYPES;
        }
        if self.contains(Features::REFERENCE_TYPES) {
            self |= Features::BULK_MEMORY;
        }
        self
    }

    pub fn by_name(name: &str) -> Option<Features> {
        Some(match name {
            "mutable-globals" => Features::MUTABLE_GLOBALS,
            "saturating-float-to-int" => Features::SATURATING_FLOAT_TO_INT,
            "sign-extension" => Features::SIGN_EXTENSION,
            "simd" => Features::SIMD,
            "threads" => Features::THREADS,
            "exceptions" => Features::EXCEPTIONS,
            "bulk-memory" => Features::BULK_MEMORY,
            "reference-types" => Features::REFERENCE_TYPES,
            "function-references" => Features::FUNCTION_REFERENCES,
            "tail-call" => Features::TAIL_CALL,
            "multi-value" => Features::MULTI_VALUE,
            "gc" => Features::GC,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_closure() {
        let f = Features::none().with(Features::GC);
        assert!(f.contains(Features::FUNCTION_REFERENCES));
        assert!(f.contains(Features::REFERENCE_TYPES));
        assert!(f.contains(Features::BULK_MEMORY));

        let f = Features::none().with(Features::EXCEPTIONS);
        assert!(f.contains(Features::REFERENCE_TYPES));
        assert!(f.contains(Features::BULK_MEMORY));
        assert!(!f.contains(Features::FUNCTION_REFERENCES));
    }

    #[test]
    fn defaults_are_mvp_plus_merged_proposals() {
        let f = Features::default();
        assert!(f.contains(Features::MUTABLE_GLOBALS));
        assert!(f.contains(Features::MULTI_VALUE));
        assert!(!f.contains(Features::SIMD));
        assert!(!f.contains(Features::THREADS));
    }
}
