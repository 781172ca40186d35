//! C source generation.
//!
//! Every function body becomes one `static` C function with the uniform
//! signature
//!
//! ```c
//! static int _f0(const double** arg, double** res, long long* iw, double* w);
//! ```
//!
//! Bodies are emitted once per distinct function object, no matter how many
//! call sites reference it; callers are wired to the shared body by symbol.
//! Dependencies always precede their callers in the output.
//!
//! Internal body symbols have the shape `<prefix>_f<n>`. Exported names are
//! sanitized to never start with an underscore, so the two cannot collide.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use log::debug;

use crate::error::Result;
use crate::float::Float;
use crate::function::{function_id, FunctionRef};

/// Knobs of the emitted C source.
#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Real type; `None` picks the C type matching the scalar type.
    pub real_type: Option<String>,
    /// Integer workspace type.
    pub index_type: String,
    /// Prefix applied to every emitted symbol.
    pub prefix: String,
    /// Emit the `#include` preamble.
    pub with_header: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            real_type: None,
            index_type: "long long".to_string(),
            prefix: String::new(),
            with_header: true,
        }
    }
}

struct Body {
    lines: Vec<String>,
}

/// Accumulates C definitions for a set of exported functions.
pub struct CodeGenerator<F: Float> {
    config: CodegenConfig,
    real: String,
    definitions: Vec<String>,
    stack: Vec<Body>,
    emitted: HashMap<usize, String>,
    // Keeps emitted functions alive so their ids cannot be reused.
    keep_alive: Vec<FunctionRef<F>>,
    exported: Vec<String>,
    counter: usize,
}

impl<F: Float> CodeGenerator<F> {
    pub fn new(config: CodegenConfig) -> Self {
        let real = config
            .real_type
            .clone()
            .unwrap_or_else(|| F::C_TYPE.to_string());
        CodeGenerator {
            config,
            real,
            definitions: Vec::new(),
            stack: Vec::new(),
            emitted: HashMap::new(),
            keep_alive: Vec::new(),
            exported: Vec::new(),
            counter: 0,
        }
    }

    /// Real type used in signatures and local arrays.
    pub fn real(&self) -> &str {
        &self.real
    }

    pub fn index_type(&self) -> &str {
        &self.config.index_type
    }

    /// Export `f` under its own name, plus a `<name>_work` size query.
    pub fn add(&mut self, f: &FunctionRef<F>) -> Result<()> {
        let symbol = self.add_dependency(f)?;
        let name = format!("{}{}", self.config.prefix, c_identifier(f.name()));
        let (ni, nr) = f.workspace_requirement();
        let (r, ii) = (&self.real, &self.config.index_type);
        let mut s = String::new();
        let _ = writeln!(
            s,
            "int {name}(const {r}** arg, {r}** res, {ii}* iw, {r}* w) {{\n  return {symbol}(arg, res, iw, w);\n}}"
        );
        let _ = writeln!(
            s,
            "void {name}_work({ii}* sz_iw, {ii}* sz_w) {{\n  *sz_iw = {ni};\n  *sz_w = {nr};\n}}"
        );
        let _ = writeln!(s, "int {name}_n_in(void) {{ return {}; }}", f.n_in());
        let _ = write!(s, "int {name}_n_out(void) {{ return {}; }}", f.n_out());
        self.exported.push(s);
        Ok(())
    }

    /// Internal symbol of `f`'s body, emitting the body on first request.
    pub fn add_dependency(&mut self, f: &FunctionRef<F>) -> Result<String> {
        let id = function_id(f);
        if let Some(symbol) = self.emitted.get(&id) {
            return Ok(symbol.clone());
        }
        let symbol = format!("{}_f{}", self.config.prefix, self.counter);
        self.counter += 1;
        self.emitted.insert(id, symbol.clone());
        self.keep_alive.push(Arc::clone(f));
        debug!("emitting body of `{}` as {symbol}", f.name());
        f.emit_body(self, &symbol)?;
        Ok(symbol)
    }

    /// Open the definition of `symbol`. Lines go to the innermost open body.
    pub fn begin_function(&mut self, symbol: &str, comment: &str) {
        let r = &self.real;
        let ii = &self.config.index_type;
        self.stack.push(Body {
            lines: vec![
                format!("/* {} */", comment.replace("*/", "* /")),
                format!("static int {symbol}(const {r}** arg, {r}** res, {ii}* iw, {r}* w) {{"),
            ],
        });
    }

    /// Append a statement to the body being emitted.
    pub fn line(&mut self, s: impl AsRef<str>) {
        if let Some(body) = self.stack.last_mut() {
            body.lines.push(format!("  {}", s.as_ref()));
        }
    }

    /// Close the innermost open body.
    pub fn end_function(&mut self) {
        if let Some(mut body) = self.stack.pop() {
            body.lines.push("  return 0;".to_string());
            body.lines.push("}".to_string());
            self.definitions.push(body.lines.join("\n"));
        }
    }

    /// C literal for `v`.
    pub fn constant(&self, v: F) -> String {
        if v.is_nan() {
            "NAN".to_string()
        } else if v.is_infinite() {
            if v > F::zero() { "INFINITY" } else { "-INFINITY" }.to_string()
        } else {
            let s = format!("{v:?}");
            if v < F::zero() {
                format!("({s})")
            } else {
                s
            }
        }
    }

    /// Number of distinct function bodies emitted so far.
    pub fn num_definitions(&self) -> usize {
        self.definitions.len()
    }

    /// The complete translation unit.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if self.config.with_header {
            out.push_str("#include <math.h>\n\n");
        }
        for def in &self.definitions {
            out.push_str(def);
            out.push_str("\n\n");
        }
        for e in &self.exported {
            out.push_str(e);
            out.push_str("\n\n");
        }
        debug!(
            "generated {} bodies, {} exports, {} bytes",
            self.definitions.len(),
            self.exported.len(),
            out.len()
        );
        out
    }
}

impl<F: Float> Default for CodeGenerator<F> {
    fn default() -> Self {
        Self::new(CodegenConfig::default())
    }
}

fn c_identifier(name: &str) -> String {
    let mut s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if s.chars().next().map_or(true, |c| c.is_ascii_digit() || c == '_') {
        s.insert_str(0, "f_");
    }
    s
}

/// Generate a self-contained C file exporting every function in `fs`.
pub fn generate<F: Float>(fs: &[FunctionRef<F>], config: CodegenConfig) -> Result<String> {
    let mut g = CodeGenerator::new(config);
    for f in fs {
        g.add(f)?;
    }
    Ok(g.dump())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_sanitized() {
        assert_eq!(c_identifier("my fun"), "my_fun");
        assert_eq!(c_identifier("1f"), "f_1f");
        assert_eq!(c_identifier("_f0"), "f__f0");
        assert_eq!(c_identifier(""), "f_");
    }

    #[test]
    fn literals() {
        let g = CodeGenerator::<f64>::default();
        assert_eq!(g.constant(2.0), "2.0");
        assert_eq!(g.constant(-0.5), "(-0.5)");
        assert_eq!(g.constant(f64::INFINITY), "INFINITY");
    }
}
