//! Unit definitions and a parser for CF/UDUNITS style unit strings.
//!
//! Accepted spellings include `kg m-2 s-1`, `kg/m2/s`, `m**2`, `m^2`,
//! `kg.m-2`, leading numeric factors such as `0.001 degC` or `1e-3`, SI
//! prefixes (`hPa`, `km`, `Pg`) and plurals (`days`).

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;

use crate::error::CmorError;

const BASE_NAMES: [&str; 7] = ["m", "kg", "s", "A", "K", "mol", "cd"];

const LENGTH: usize = 0;
const MASS: usize = 1;
const TIME: usize = 2;
const CURRENT: usize = 3;
const TEMPERATURE: usize = 4;
const AMOUNT: usize = 5;
const LUMINOSITY: usize = 6;

const AVOGADRO: f64 = 6.022_140_76e23;

/// Longest prefixes first so `da` wins over `d`.
const PREFIXES: &[(&str, f64)] = &[
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
    ("y", 1e-24),
];

/// Exponents of the SI base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension([i32; 7]);

impl Dimension {
    pub const NONE: Dimension = Dimension([0; 7]);

    const fn of(pairs: &[(usize, i32)]) -> Self {
        let mut exps = [0; 7];
        let mut i = 0;
        while i < pairs.len() {
            exps[pairs[i].0] = pairs[i].1;
            i += 1;
        }
        Dimension(exps)
    }

    fn mul(self, other: Dimension) -> Self {
        let mut exps = self.0;
        for (exp, extra) in exps.iter_mut().zip(other.0) {
            *exp += extra;
        }
        Dimension(exps)
    }

    fn powi(self, n: i32) -> Self {
        Dimension(self.0.map(|exp| exp * n))
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("1");
        }
        let parts: Vec<String> = BASE_NAMES
            .iter()
            .zip(self.0)
            .filter(|(_, exp)| *exp != 0)
            .map(|(name, exp)| match exp {
                1 => name.to_string(),
                _ => format!("{name}{exp}"),
            })
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// `si = value * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    pub scale: f64,
    pub offset: f64,
    pub dimension: Dimension,
    pub prefixable: bool,
}

impl UnitDef {
    pub const fn new(scale: f64, dimension: Dimension) -> Self {
        Self {
            scale,
            offset: 0.0,
            dimension,
            prefixable: false,
        }
    }

    pub const fn prefixed(scale: f64, dimension: Dimension) -> Self {
        Self {
            scale,
            offset: 0.0,
            dimension,
            prefixable: true,
        }
    }

    const fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

/// A parsed unit expression.
///
/// `factor` collects the bare numbers of the expression and is kept apart
/// from `scale`, the SI multiplier of the named units.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUnit {
    pub expression: String,
    pub factor: f64,
    pub scale: f64,
    pub offset: f64,
    pub dimension: Dimension,
    pub terms: Vec<(String, i32)>,
}

impl ParsedUnit {
    fn number(value: f64) -> Self {
        Self {
            expression: String::new(),
            factor: value,
            scale: 1.0,
            offset: 0.0,
            dimension: Dimension::NONE,
            terms: Vec::new(),
        }
    }

    fn named(name: &str, def: UnitDef, exponent: i32) -> Self {
        Self {
            expression: String::new(),
            factor: 1.0,
            scale: def.scale.powi(exponent),
            offset: 0.0,
            dimension: def.dimension.powi(exponent),
            terms: vec![(name.to_string(), exponent)],
        }
    }

    fn times(mut self, other: ParsedUnit) -> Self {
        self.factor *= other.factor;
        self.scale *= other.scale;
        self.dimension = self.dimension.mul(other.dimension);
        for (name, exp) in other.terms {
            match self.terms.iter_mut().find(|(existing, _)| *existing == name) {
                Some((_, total)) => *total += exp,
                None => self.terms.push((name, exp)),
            }
        }
        self.terms.retain(|(_, exp)| *exp != 0);
        self
    }

    fn powi(mut self, n: i32) -> Self {
        self.factor = self.factor.powi(n);
        self.scale = self.scale.powi(n);
        self.dimension = self.dimension.powi(n);
        for (_, exp) in &mut self.terms {
            *exp *= n;
        }
        self.terms.retain(|(_, exp)| *exp != 0);
        self
    }

    /// The expression carries a numeric multiplier other than one.
    pub fn is_scaled(&self) -> bool {
        self.factor != 1.0
    }

    /// No named unit is left, e.g. `1`, `1e-3` or `dimensionless`.
    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn to_si(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }

    pub fn from_si(&self, value: f64) -> f64 {
        (value - self.offset) / self.scale
    }

    /// Named units without the numeric factor, e.g. `degC` for `0.001 degC`.
    pub fn unit_string(&self) -> String {
        if self.terms.is_empty() {
            return "1".to_string();
        }
        self.terms
            .iter()
            .map(|(name, exp)| match exp {
                1 => name.clone(),
                _ => format!("{name}{exp}"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Unit definitions available to one conversion session.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: HashMap<String, UnitDef>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
        };
        registry.define_defaults();
        registry
    }

    pub fn define(&mut self, name: &str, def: UnitDef) {
        self.units.insert(name.to_string(), def);
    }

    /// Defines `name` as `scale` times an already known unit.
    pub fn define_alias(&mut self, name: &str, scale: f64, unit: &str) -> Result<(), CmorError> {
        let parsed = self.parse(unit)?;
        self.define(
            name,
            UnitDef::prefixed(parsed.factor * parsed.scale * scale, parsed.dimension),
        );
        Ok(())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<UnitDef> {
        if let Some(def) = self.units.get(name) {
            return Some(*def);
        }
        for (prefix, multiplier) in PREFIXES {
            let Some(rest) = name.strip_prefix(prefix) else {
                continue;
            };
            if let Some(def) = self.units.get(rest).filter(|def| def.prefixable) {
                return Some(UnitDef {
                    scale: def.scale * multiplier,
                    ..*def
                });
            }
        }
        let singular = name.strip_suffix('s').filter(|stem| stem.len() > 1)?;
        self.units.get(singular).copied()
    }

    pub fn parse(&self, expression: &str) -> Result<ParsedUnit, CmorError> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            registry: self,
            tokens: &tokens,
            position: 0,
            expression,
        };
        let mut parsed = if tokens.is_empty() {
            ParsedUnit::number(1.0)
        } else {
            parser.product()?
        };
        if parser.position != tokens.len() {
            return Err(syntax_error(expression));
        }
        // Offsets only hold for a lone temperature unit; in products they are differences.
        parsed.offset = match parsed.terms.as_slice() {
            [(name, 1)] => self.lookup(name).map_or(0.0, |def| def.offset),
            _ => 0.0,
        };
        parsed.expression = expression.to_string();
        Ok(parsed)
    }

    fn define_defaults(&mut self) {
        let length = Dimension::of(&[(LENGTH, 1)]);
        let mass = Dimension::of(&[(MASS, 1)]);
        let time = Dimension::of(&[(TIME, 1)]);
        let temperature = Dimension::of(&[(TEMPERATURE, 1)]);
        let amount = Dimension::of(&[(AMOUNT, 1)]);
        let volume = Dimension::of(&[(LENGTH, 3)]);
        let frequency = Dimension::of(&[(TIME, -1)]);
        let force = Dimension::of(&[(MASS, 1), (LENGTH, 1), (TIME, -2)]);
        let pressure = Dimension::of(&[(MASS, 1), (LENGTH, -1), (TIME, -2)]);
        let energy = Dimension::of(&[(MASS, 1), (LENGTH, 2), (TIME, -2)]);
        let power = Dimension::of(&[(MASS, 1), (LENGTH, 2), (TIME, -3)]);
        let charge = Dimension::of(&[(CURRENT, 1), (TIME, 1)]);
        let voltage = Dimension::of(&[(MASS, 1), (LENGTH, 2), (TIME, -3), (CURRENT, -1)]);
        let resistance = Dimension::of(&[(MASS, 1), (LENGTH, 2), (TIME, -3), (CURRENT, -2)]);
        let areal_amount = Dimension::of(&[(AMOUNT, 1), (LENGTH, -2)]);
        let flow = Dimension::of(&[(LENGTH, 3), (TIME, -1)]);
        let day = 86_400.0;

        let defs: &[(&[&str], UnitDef)] = &[
            (&["m", "metre", "meter"], UnitDef::prefixed(1.0, length)),
            (&["g", "gram"], UnitDef::prefixed(1e-3, mass)),
            (&["kg", "kilogram"], UnitDef::new(1.0, mass)),
            (&["t", "tonne"], UnitDef::prefixed(1e3, mass)),
            (&["s", "second"], UnitDef::prefixed(1.0, time)),
            (&["sec"], UnitDef::new(1.0, time)),
            (&["min", "minute"], UnitDef::new(60.0, time)),
            (&["h", "hr", "hour"], UnitDef::new(3_600.0, time)),
            (&["d", "day"], UnitDef::new(day, time)),
            (&["week"], UnitDef::new(7.0 * day, time)),
            (&["yr", "year"], UnitDef::new(365.25 * day, time)),
            (&["common_year"], UnitDef::new(365.0 * day, time)),
            (&["A", "ampere"], UnitDef::prefixed(1.0, Dimension::of(&[(CURRENT, 1)]))),
            (&["K", "kelvin", "degK", "deg_K"], UnitDef::prefixed(1.0, temperature)),
            (
                &["degC", "deg_C", "celsius", "degree_Celsius", "degrees_Celsius", "°C"],
                UnitDef::new(1.0, temperature).with_offset(273.15),
            ),
            (
                &["degF", "deg_F", "fahrenheit", "degree_Fahrenheit", "°F"],
                UnitDef::new(5.0 / 9.0, temperature).with_offset(459.67 * 5.0 / 9.0),
            ),
            (&["mol", "mole"], UnitDef::prefixed(1.0, amount)),
            (&["molecule", "molec"], UnitDef::new(1.0 / AVOGADRO, amount)),
            (&["cd", "candela"], UnitDef::prefixed(1.0, Dimension::of(&[(LUMINOSITY, 1)]))),
            (&["Hz", "hertz"], UnitDef::prefixed(1.0, frequency)),
            (&["N", "newton"], UnitDef::prefixed(1.0, force)),
            (&["Pa", "pascal"], UnitDef::prefixed(1.0, pressure)),
            (&["bar"], UnitDef::prefixed(1e5, pressure)),
            (&["atm", "atmosphere"], UnitDef::new(101_325.0, pressure)),
            (&["J", "joule"], UnitDef::prefixed(1.0, energy)),
            (&["W", "watt"], UnitDef::prefixed(1.0, power)),
            (&["C", "coulomb"], UnitDef::prefixed(1.0, charge)),
            (&["V", "volt"], UnitDef::prefixed(1.0, voltage)),
            (&["ohm"], UnitDef::prefixed(1.0, resistance)),
            (&["L", "l", "liter", "litre"], UnitDef::prefixed(1e-3, volume)),
            (&["sverdrup"], UnitDef::new(1e6, flow)),
            (&["DU", "dobson_unit"], UnitDef::new(2.687e20 / AVOGADRO, areal_amount)),
            (&["rad", "radian"], UnitDef::prefixed(1.0, Dimension::NONE)),
            (&["sr", "steradian"], UnitDef::new(1.0, Dimension::NONE)),
            (
                &[
                    "degree", "deg", "arc_degree", "degree_north", "degrees_north", "degree_N",
                    "degrees_N", "degree_east", "degrees_east", "degree_E", "degrees_E",
                ],
                UnitDef::new(PI / 180.0, Dimension::NONE),
            ),
            (&["%", "percent"], UnitDef::new(1e-2, Dimension::NONE)),
            (&["permil", "per_mille"], UnitDef::new(1e-3, Dimension::NONE)),
            (&["psu", "PSU"], UnitDef::new(1e-3, Dimension::NONE)),
            (&["ppm", "ppmv"], UnitDef::new(1e-6, Dimension::NONE)),
            (&["ppb", "ppbv"], UnitDef::new(1e-9, Dimension::NONE)),
            (&["ppt", "pptv"], UnitDef::new(1e-12, Dimension::NONE)),
        ];
        for (names, def) in defs {
            for name in *names {
                self.define(name, *def);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Unit(String, i32),
    Mul,
    Div,
    Pow,
    Open,
    Close,
}

fn syntax_error(expression: &str) -> CmorError {
    CmorError::Format {
        kind: "unit".to_string(),
        value: expression.to_string(),
        expected: "a unit expression such as `kg m-2 s-1`".to_string(),
    }
}

fn is_unit_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '°' || c == 'µ'
}

fn tokenize(expression: &str) -> Result<Vec<Token>, CmorError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let expects_operand = matches!(
            tokens.last(),
            None | Some(Token::Mul | Token::Div | Token::Pow | Token::Open)
        );
        match c {
            _ if c.is_whitespace() => i += 1,
            '*' if next == Some('*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '*' | '·' => {
                tokens.push(Token::Mul);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Div);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '.' if !(expects_operand && next.is_some_and(|n| n.is_ascii_digit())) => {
                tokens.push(Token::Mul);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Unit("%".to_string(), 1));
                i += 1;
            }
            _ if c.is_ascii_digit()
                || c == '.'
                || (matches!(c, '-' | '+') && expects_operand && next.is_some_and(|n| n.is_ascii_digit() || n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '-' | '+') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| syntax_error(expression))?;
                tokens.push(Token::Number(value));
            }
            _ if is_unit_char(c) => {
                let start = i;
                while i < chars.len() && is_unit_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let exp_start = i;
                if i < chars.len()
                    && matches!(chars[i], '-' | '+')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit)
                {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let exponent = if i == exp_start {
                    1
                } else {
                    let text: String = chars[exp_start..i].iter().collect();
                    text.parse::<i32>().map_err(|_| syntax_error(expression))?
                };
                tokens.push(Token::Unit(name, exponent));
            }
            _ => return Err(syntax_error(expression)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    registry: &'a UnitRegistry,
    tokens: &'a [Token],
    position: usize,
    expression: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn product(&mut self) -> Result<ParsedUnit, CmorError> {
        let mut acc = self.power()?;
        loop {
            match self.peek() {
                Some(Token::Mul) => {
                    self.position += 1;
                    acc = acc.times(self.power()?);
                }
                Some(Token::Div) => {
                    self.position += 1;
                    acc = acc.times(self.power()?.powi(-1));
                }
                Some(Token::Number(_) | Token::Unit(..) | Token::Open) => {
                    acc = acc.times(self.power()?);
                }
                _ => return Ok(acc),
            }
        }
    }

    fn power(&mut self) -> Result<ParsedUnit, CmorError> {
        let base = self.atom()?;
        if self.peek() != Some(&Token::Pow) {
            return Ok(base);
        }
        self.position += 1;
        match self.peek() {
            Some(Token::Number(exp)) if exp.fract() == 0.0 => {
                let exp = *exp as i32;
                self.position += 1;
                Ok(base.powi(exp))
            }
            _ => Err(syntax_error(self.expression)),
        }
    }

    fn atom(&mut self) -> Result<ParsedUnit, CmorError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| syntax_error(self.expression))?;
        self.position += 1;
        match token {
            Token::Number(value) => Ok(ParsedUnit::number(value)),
            Token::Unit(name, exponent) if name == "dimensionless" => {
                Ok(ParsedUnit::number(1.0).powi(exponent))
            }
            Token::Unit(name, exponent) => {
                let def = self
                    .registry
                    .lookup(&name)
                    .ok_or_else(|| CmorError::UndefinedUnit(name.clone()))?;
                Ok(ParsedUnit::named(&name, def, exponent))
            }
            Token::Open => {
                let inner = self.product()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(syntax_error(self.expression));
                }
                self.position += 1;
                Ok(inner)
            }
            _ => Err(syntax_error(self.expression)),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn spellings_of_a_flux_agree() {
        let registry = UnitRegistry::new();
        let reference = registry.parse("kg m-2 s-1").unwrap();
        for spelling in ["kg/m2/s", "kg m^-2 s^-1", "kg * m**-2 * s**-1", "kg.m-2.s-1", "kg/(m2 s)"] {
            let parsed = registry.parse(spelling).unwrap();
            assert_eq!(parsed.dimension, reference.dimension, "{spelling}");
            assert!(close(parsed.scale, reference.scale), "{spelling}");
        }
    }

    #[test]
    fn prefixes_and_plurals() {
        let registry = UnitRegistry::new();
        assert!(close(registry.parse("hPa").unwrap().scale, 100.0));
        assert!(close(registry.parse("km").unwrap().scale, 1000.0));
        assert!(close(registry.parse("Pg").unwrap().scale, 1e12));
        assert!(close(registry.parse("days").unwrap().scale, 86_400.0));
        assert!(close(registry.parse("ms").unwrap().scale, 1e-3));
    }

    #[test]
    fn numeric_factor_is_tracked_apart() {
        let registry = UnitRegistry::new();
        let parsed = registry.parse("0.001 degC").unwrap();
        assert!(parsed.is_scaled());
        assert!(close(parsed.factor, 0.001));
        assert_eq!(parsed.unit_string(), "degC");
        assert!(close(parsed.offset, 273.15));

        let number = registry.parse("1e-3").unwrap();
        assert!(number.is_dimensionless());
        assert!(number.is_scaled());
        assert!(!registry.parse("1").unwrap().is_scaled());
    }

    #[test]
    fn offsets_only_apply_to_bare_temperatures() {
        let registry = UnitRegistry::new();
        assert_eq!(registry.parse("degC s-1").unwrap().offset, 0.0);
    }

    #[test]
    fn undefined_and_malformed() {
        let registry = UnitRegistry::new();
        assert_matches!(registry.parse("furlong"), Err(CmorError::UndefinedUnit(name)) if name == "furlong");
        assert_matches!(registry.parse("kg m^"), Err(CmorError::Format { .. }));
        assert_matches!(registry.parse("(kg"), Err(CmorError::Format { .. }));
    }
}
