use std::fmt;

use askama_escape::{escape, Escaper};
use minijinja::syntax::SyntaxConfig;
use minijinja::{path_loader, AutoEscape, Environment};

use crate::config::{Config, Context, Syntax};

/// Escapes the characters LaTeX treats specially.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tex;

impl Escaper for Tex {
    fn write_escaped<W>(&self, mut fmt: W, string: &str) -> fmt::Result
    where
        W: fmt::Write,
    {
        for c in string.chars() {
            match c {
                '%' => fmt.write_str("\\%")?,
                '$' => fmt.write_str("\\$")?,
                '&' => fmt.write_str("\\&")?,
                '#' => fmt.write_str("\\#")?,
                '_' => fmt.write_str("\\_")?,
                '{' => fmt.write_str("\\{")?,
                '}' => fmt.write_str("\\}")?,
                '~' => fmt.write_str("\\textasciitilde{}")?,
                '^' => fmt.write_str("\\textasciicircum{}")?,
                '\\' => fmt.write_str("\\textbackslash{}")?,
                _ => fmt.write_char(c)?,
            }
        }
        Ok(())
    }
}

pub fn tex_escape(string: &str) -> String {
    escape(string, Tex).to_string()
}

/// Fixed-point rendering of an amount, two digits unless told otherwise.
pub fn currency(amount: f64, digits: Option<usize>) -> String {
    format!("{:.*}", digits.unwrap_or(2), amount)
}

fn latex(value: &str) -> String {
    tex_escape(value)
}

fn syntax(syntax: &Syntax) -> Result<SyntaxConfig, minijinja::Error> {
    SyntaxConfig::builder()
        .block_delimiters(syntax.block_start.clone(), syntax.block_end.clone())
        .variable_delimiters(
            syntax.variable_start.clone(),
            syntax.variable_end.clone(),
        )
        .comment_delimiters(
            syntax.comment_start.clone(),
            syntax.comment_end.clone(),
        )
        .build()
}

pub fn environment(
    config: &Config,
) -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_syntax(syntax(&config.syntax)?);
    env.set_loader(path_loader(config.template_dir.clone()));
    env.set_auto_escape_callback(|_name: &str| AutoEscape::None);
    env.add_filter("currency", currency);
    env.add_filter("latex", latex);
    Ok(env)
}

pub fn render(
    config: &Config,
    context: &Context,
) -> Result<String, minijinja::Error> {
    let env = environment(config)?;
    let template = env.get_template(&config.template_name)?;
    template.render(context)
}
