//! Generic formula-driven index builder
//!
//! Computes arbitrary derived indices from user-defined formulas over
//! named inputs, either per pixel over rasters or once over scalar
//! values that already went through a regional reduction.
//!
//! Example formulas:
//! - `"(NIR - Red) / (NIR + Red + 0.0001)"` → NDVI
//! - `"2.5 * (NIR - Red) / (NIR + 6 * Red - 7.5 * Blue + 1)"` → EVI
//! - `"ln(pop_present / pop_past) / 5"` → annualized growth rate
//!
//! Supported: `+`, `-`, `*`, `/`, unary minus, parentheses, numeric
//! constants, and the functions `ln`, `log10`, `sqrt`, `abs`, `min`, `max`.

use std::collections::HashMap;

use crate::maybe_rayon::*;
use zonalis_core::{Error, Raster, Result};

use super::{build_output, is_nodata_f64};

/// A token in the parsed expression
#[derive(Debug, Clone)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char), // +, -, *, /
    Comma,
    LParen,
    RParen,
}

/// Built-in functions callable from formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Ln,
    Log10,
    Sqrt,
    Abs,
    Min,
    Max,
}

impl Func {
    fn from_name(name: &str) -> Option<(Func, usize)> {
        match name {
            "ln" => Some((Func::Ln, 1)),
            "log10" => Some((Func::Log10, 1)),
            "sqrt" => Some((Func::Sqrt, 1)),
            "abs" => Some((Func::Abs, 1)),
            "min" => Some((Func::Min, 2)),
            "max" => Some((Func::Max, 2)),
            _ => None,
        }
    }
}

/// A node in the expression AST
#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Input(String),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

/// Tokenize a formula string
fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' => {
                i += 1;
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num = num_str
                    .parse::<f64>()
                    .map_err(|_| Error::Formula(format!("invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(name));
            }
            c => {
                return Err(Error::Formula(format!(
                    "unexpected character '{}' in formula",
                    c
                )));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser for arithmetic expressions
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        if self.pos < self.tokens.len() {
            let t = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(t)
        } else {
            None
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.tokens.len()
    }

    /// Parse: expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;

        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse: term = factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;

        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse: factor = number | input | func '(' args ')' | '(' expr ')' | '-' factor
    fn parse_factor(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.parse_call(&name)
                } else {
                    Ok(Expr::Input(name))
                }
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(Error::Formula("expected closing parenthesis".into())),
                }
            }
            Some(Token::Op('-')) => {
                self.advance();
                let factor = self.parse_factor()?;
                Ok(Expr::Neg(Box::new(factor)))
            }
            Some(Token::Op('+')) => {
                self.advance();
                self.parse_factor()
            }
            other => Err(Error::Formula(format!(
                "unexpected token in formula: {:?}",
                other
            ))),
        }
    }

    /// Parse a function call; the name is consumed, the '(' is next.
    fn parse_call(&mut self, name: &str) -> Result<Expr> {
        let (func, arity) = Func::from_name(name)
            .ok_or_else(|| Error::Formula(format!("unknown function '{}'", name)))?;
        self.advance(); // consume '('

        let mut args = vec![self.parse_expr()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            args.push(self.parse_expr()?);
        }
        match self.advance() {
            Some(Token::RParen) => {}
            _ => return Err(Error::Formula("expected closing parenthesis".into())),
        }

        if args.len() != arity {
            return Err(Error::Formula(format!(
                "{} expects {} argument(s), got {}",
                name,
                arity,
                args.len()
            )));
        }
        Ok(Expr::Call { func, args })
    }
}

/// Parse a complete formula, rejecting trailing garbage.
fn parse(formula: &str) -> Result<Expr> {
    let tokens = tokenize(formula)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if !parser.at_end() {
        return Err(Error::Formula(format!(
            "unexpected trailing input after position {}",
            parser.pos
        )));
    }
    Ok(expr)
}

/// Evaluate an expression against named input values.
///
/// Inputs are few, so a linear scan beats hashing here.
fn eval(expr: &Expr, inputs: &[(String, f64)]) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Input(name) => inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or(f64::NAN),
        Expr::BinOp { op, left, right } => {
            let l = eval(left, inputs);
            let r = eval(right, inputs);
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r.abs() < 1e-10 {
                        f64::NAN
                    } else {
                        l / r
                    }
                }
                _ => f64::NAN,
            }
        }
        Expr::Neg(inner) => -eval(inner, inputs),
        Expr::Call { func, args } => {
            let a = eval(&args[0], inputs);
            match func {
                Func::Ln => {
                    if a > 0.0 {
                        a.ln()
                    } else {
                        f64::NAN
                    }
                }
                Func::Log10 => {
                    if a > 0.0 {
                        a.log10()
                    } else {
                        f64::NAN
                    }
                }
                Func::Sqrt => a.sqrt(),
                Func::Abs => a.abs(),
                Func::Min | Func::Max => {
                    let b = eval(&args[1], inputs);
                    if a.is_nan() || b.is_nan() {
                        f64::NAN
                    } else if *func == Func::Min {
                        a.min(b)
                    } else {
                        a.max(b)
                    }
                }
            }
        }
    }
}

/// Collect all input names referenced in an expression
fn collect_inputs(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Input(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Expr::BinOp { left, right, .. } => {
            collect_inputs(left, names);
            collect_inputs(right, names);
        }
        Expr::Neg(inner) => collect_inputs(inner, names),
        Expr::Call { args, .. } => {
            for arg in args {
                collect_inputs(arg, names);
            }
        }
        Expr::Num(_) => {}
    }
}

/// Compute a derived index raster from a formula and named bands.
///
/// All referenced bands must be present in the map and share dimensions.
/// Pixels where any referenced band is nodata come out NaN, as do pixels
/// whose formula hits a vanishing divisor or a log of a non-positive value.
pub fn derive_index(formula: &str, bands: &HashMap<&str, &Raster<f64>>) -> Result<Raster<f64>> {
    let expr = parse(formula)?;

    let mut referenced = Vec::new();
    collect_inputs(&expr, &mut referenced);
    if referenced.is_empty() {
        return Err(Error::Formula(
            "formula references no input bands".to_string(),
        ));
    }
    for name in &referenced {
        if !bands.contains_key(name.as_str()) {
            return Err(Error::Formula(format!(
                "band '{}' not found, available: {:?}",
                name,
                bands.keys().collect::<Vec<_>>()
            )));
        }
    }

    // Only referenced bands are read; extra map entries are ignored.
    let band_refs: Vec<&Raster<f64>> = referenced
        .iter()
        .filter_map(|name| bands.get(name.as_str()).copied())
        .collect();
    let first = band_refs[0];
    let (rows, cols) = first.shape();
    for raster in &band_refs {
        if raster.shape() != (rows, cols) {
            return Err(Error::ShapeMismatch {
                expected: (rows, cols),
                actual: raster.shape(),
            });
        }
    }
    let nodatas: Vec<Option<f64>> = band_refs.iter().map(|r| r.nodata()).collect();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values: Vec<(String, f64)> = referenced
                .iter()
                .map(|name| (name.clone(), f64::NAN))
                .collect();

            for (col, out) in row_data.iter_mut().enumerate() {
                let mut any_nodata = false;
                for (i, slot) in values.iter_mut().enumerate() {
                    let val = unsafe { band_refs[i].get_unchecked(row, col) };
                    if is_nodata_f64(val, nodatas[i]) {
                        any_nodata = true;
                        break;
                    }
                    slot.1 = val;
                }
                if !any_nodata {
                    *out = eval(&expr, &values);
                }
            }

            row_data
        })
        .collect();

    build_output(first, rows, cols, output_data)
}

/// Evaluate a formula once over scalar inputs, typically values a regional
/// reduction produced.
///
/// A referenced input that is missing from the map is an error; an input
/// that is present but null propagates to a null result. Non-finite
/// results (vanishing divisors, logs of non-positive values) are null too.
pub fn derive_value(formula: &str, inputs: &HashMap<&str, Option<f64>>) -> Result<Option<f64>> {
    let expr = parse(formula)?;

    let mut referenced = Vec::new();
    collect_inputs(&expr, &mut referenced);

    let mut values = Vec::with_capacity(referenced.len());
    for name in &referenced {
        match inputs.get(name.as_str()) {
            Some(Some(v)) if !v.is_nan() => values.push((name.clone(), *v)),
            Some(_) => return Ok(None),
            None => {
                return Err(Error::Formula(format!(
                    "input '{}' not found, available: {:?}",
                    name,
                    inputs.keys().collect::<Vec<_>>()
                )))
            }
        }
    }

    let out = eval(&expr, &values);
    Ok(out.is_finite().then_some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonalis_core::GeoTransform;

    fn make_band(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_ndvi_formula() {
        let nir = make_band(5, 5, 0.8);
        let red = make_band(5, 5, 0.2);

        let mut bands = HashMap::new();
        bands.insert("NIR", &nir);
        bands.insert("Red", &red);

        let result = derive_index("(NIR - Red) / (NIR + Red)", &bands).unwrap();
        let v = result.get(2, 2).unwrap();
        assert!((v - 0.6).abs() < 1e-10, "NDVI should be 0.6, got {}", v);
    }

    #[test]
    fn test_formula_matches_builtin_ndvi() {
        let nir = make_band(4, 4, 0.5);
        let red = make_band(4, 4, 0.1);

        let mut bands = HashMap::new();
        bands.insert("NIR", &nir);
        bands.insert("Red", &red);

        let from_formula =
            derive_index("(NIR - Red) / (NIR + Red + 0.0001)", &bands).unwrap();
        let builtin = crate::index::ndvi(&nir, &red).unwrap();
        let a = from_formula.get(1, 1).unwrap();
        let b = builtin.get(1, 1).unwrap();
        assert!((a - b).abs() < 1e-12, "formula {} vs builtin {}", a, b);
    }

    #[test]
    fn test_operator_precedence() {
        let a = make_band(3, 3, 5.0);
        let mut bands = HashMap::new();
        bands.insert("A", &a);

        let result = derive_index("A * 2.5 + 10", &bands).unwrap();
        assert!((result.get(1, 1).unwrap() - 22.5).abs() < 1e-10);

        let result = derive_index("10 + A * 2", &bands).unwrap();
        assert!((result.get(1, 1).unwrap() - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_unary_minus() {
        let a = make_band(3, 3, 4.0);
        let mut bands = HashMap::new();
        bands.insert("A", &a);

        let result = derive_index("-A + 1", &bands).unwrap();
        assert!((result.get(1, 1).unwrap() + 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_function_calls() {
        let a = make_band(3, 3, 100.0);
        let b = make_band(3, 3, 9.0);
        let mut bands = HashMap::new();
        bands.insert("A", &a);
        bands.insert("B", &b);

        let ln = derive_index("ln(A)", &bands).unwrap();
        assert!((ln.get(1, 1).unwrap() - 100.0_f64.ln()).abs() < 1e-10);

        let log = derive_index("log10(A)", &bands).unwrap();
        assert!((log.get(1, 1).unwrap() - 2.0).abs() < 1e-10);

        let sqrt = derive_index("sqrt(B)", &bands).unwrap();
        assert!((sqrt.get(1, 1).unwrap() - 3.0).abs() < 1e-10);

        let abs = derive_index("abs(B - A)", &bands).unwrap();
        assert!((abs.get(1, 1).unwrap() - 91.0).abs() < 1e-10);

        let mn = derive_index("min(A, B)", &bands).unwrap();
        assert!((mn.get(1, 1).unwrap() - 9.0).abs() < 1e-10);

        let mx = derive_index("max(A, B) / 2", &bands).unwrap();
        assert!((mx.get(1, 1).unwrap() - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_log_of_nonpositive_is_nodata() {
        let a = make_band(3, 3, -5.0);
        let mut bands = HashMap::new();
        bands.insert("A", &a);

        let result = derive_index("ln(A)", &bands).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_division_by_zero_returns_nan() {
        let a = make_band(3, 3, 1.0);
        let b = make_band(3, 3, 0.0);

        let mut bands = HashMap::new();
        bands.insert("A", &a);
        bands.insert("B", &b);

        let result = derive_index("A / B", &bands).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_declared_nodata_propagates() {
        let mut a = make_band(3, 3, 2.0);
        a.set_nodata(Some(-9999.0));
        a.set(0, 0, -9999.0).unwrap();
        let mut bands = HashMap::new();
        bands.insert("A", &a);

        let result = derive_index("A * 2", &bands).unwrap();
        assert!(result.get(0, 0).unwrap().is_nan());
        assert!((result.get(1, 1).unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_parse_errors() {
        let a = make_band(3, 3, 1.0);
        let mut bands = HashMap::new();
        bands.insert("A", &a);

        assert!(derive_index("(A - ", &bands).is_err());
        assert!(derive_index("A B", &bands).is_err());
        assert!(derive_index("foo(A)", &bands).is_err());
        assert!(derive_index("min(A)", &bands).is_err());
        assert!(derive_index("A + Missing", &bands).is_err());
        assert!(derive_index("3 + 4", &bands).is_err());
    }

    #[test]
    fn test_derive_value_scalar() {
        let mut inputs = HashMap::new();
        inputs.insert("built_past", Some(10.0));
        inputs.insert("built_present", Some(15.0));

        let v = derive_value(
            "(built_present - built_past) / built_past / 5",
            &inputs,
        )
        .unwrap();
        assert!((v.unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_derive_value_null_propagation() {
        let mut inputs = HashMap::new();
        inputs.insert("a", Some(1.0));
        inputs.insert("b", None);

        assert_eq!(derive_value("a + b", &inputs).unwrap(), None);
        assert_eq!(derive_value("a * 2", &inputs).unwrap(), Some(2.0));
        assert!(derive_value("a + c", &inputs).is_err());
        // Vanishing divisor comes back null, not an error.
        assert_eq!(derive_value("a / (a - 1)", &inputs).unwrap(), None);
    }
}
