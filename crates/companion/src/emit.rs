//! Shim source emission.
//!
//! Everything generated carries `used` and lands in a dedicated section so
//! link-time dead-stripping cannot discard it; a linker script keeping
//! `.gti2.*` makes the shims (and their DWARF) survive into the final
//! image.

use crate::inline::InlineFn;
use crate::macros::MacroDef;

/// Symbol prefixes and section names for generated code.
#[derive(Debug, Clone)]
pub struct Naming {
    /// Prefix of every generated symbol.
    pub prefix: String,
    /// Prefix of out-pointer call variants.
    pub prefix_ptr: String,
    /// Section for generated functions.
    pub text_section: String,
    /// Section for generated constants.
    pub rodata_section: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            prefix: "_gti2_".into(),
            prefix_ptr: "_gti2_ptr_".into(),
            text_section: ".gti2.text".into(),
            rodata_section: ".gti2.rodata".into(),
        }
    }
}

impl Naming {
    fn func_flags(&self) -> String {
        format!(
            "__attribute__((noinline, used, section(\"{}\")))",
            self.text_section
        )
    }

    fn const_flags(&self) -> String {
        format!("__attribute__((used, section(\"{}\")))", self.rodata_section)
    }

    /// The `#include` header for the generated unit.
    #[must_use]
    pub fn emit_header(&self, sources: &[String]) -> String {
        let mut out = String::new();
        for file in ["stdint.h", "stdlib.h"]
            .iter()
            .copied()
            .chain(sources.iter().map(String::as_str))
        {
            out.push_str(&format!("#include \"{file}\"\n"));
        }
        out
    }

    /// A non-inline forwarding wrapper for an inline function.
    #[must_use]
    pub fn emit_inline_wrapper(&self, func: &InlineFn) -> String {
        format!(
            "{} {} {}{}({}) {{ return {}({}); }}\n",
            self.func_flags(),
            func.return_type,
            self.prefix,
            func.name,
            func.param_decls(),
            func.name,
            func.forward_args(),
        )
    }

    /// The pass-by-out-pointer variant: `void _gti2_ptr_f(RET *_, …)`.
    ///
    /// Returns large values through memory, which register-based remote
    /// calls cannot carry. Emitted for every non-void inline return; the
    /// host only redirects to it when the return type is wider than a
    /// pointer word.
    #[must_use]
    pub fn emit_inline_ptr_wrapper(&self, func: &InlineFn) -> String {
        if func.returns_void() {
            return String::new();
        }
        let params = func.param_decls();
        let out_param = if params == "void" {
            format!("{} *_", func.return_type)
        } else {
            format!("{} *_, {}", func.return_type, params)
        };
        format!(
            "{} void {}{}({}) {{ *_ = {}({}); }}\n",
            self.func_flags(),
            self.prefix_ptr,
            func.name,
            out_param,
            func.name,
            func.forward_args(),
        )
    }

    /// `const char _gti2_M[] = M;` for a string-valued macro.
    #[must_use]
    pub fn emit_string_macro(&self, def: &MacroDef) -> String {
        format!(
            "{} const char {}{}[] = {};\n",
            self.const_flags(),
            self.prefix,
            def.name,
            def.name,
        )
    }

    /// `const long long _gti2_M = M;` for a numeric macro.
    #[must_use]
    pub fn emit_numeric_macro(&self, def: &MacroDef) -> String {
        format!(
            "{} const long long {}{} = {};\n",
            self.const_flags(),
            self.prefix,
            def.name,
            def.name,
        )
    }

    /// An `unsigned long` wrapper function for a function-like macro.
    #[must_use]
    pub fn emit_function_macro(&self, def: &MacroDef) -> String {
        let params = def.params.as_deref().unwrap_or_default();
        let decls = params
            .iter()
            .map(|p| format!("unsigned long {p}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} unsigned long {}{}({}) {{ return {}({}); }}\n",
            self.func_flags(),
            self.prefix,
            def.name,
            decls,
            def.name,
            params.join(", "),
        )
    }
}
