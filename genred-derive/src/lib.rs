//! proc-macro checking generic reduction formulas at compile time

use genred_formula::Formula;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use proc_macro_error::{abort_call_site, proc_macro_error};
use quote::quote;
use syn::parse::Parser;

/// Reduction checked at compile time
///
/// ```
/// use ndarray::array;
/// use genred::genred;
///
/// let r = genred!("Sum_Reduction(x*y,1)", "x=Vx(0,1)", "y=Vy(1,1)");
/// let x = array![[1.0], [2.0]];
/// let y = array![[1.0], [2.0], [3.0]];
/// let out = r.call(&[(&x).into(), (&y).into()]).unwrap();
/// assert_eq!(out, array![[6.0], [12.0]]);
/// ```
///
/// The first literal is the reduction `<Op>_Reduction(<formula>,<axis>)`,
/// the following ones are the alias declarations. Syntax, aliases and
/// dimensions are checked while compiling, and the expansion evaluates to a
/// `genred::Reduction` using the `auto` backend.
///
/// - Adding vectors of different dimensions does not compile:
///
///   ```compile_fail
///   use genred::genred;
///
///   let r = genred!("Sum_Reduction(x+y,1)", "x=Vx(0,2)", "y=Vy(1,3)");
///   ```
///
/// - Neither does an undeclared name:
///
///   ```compile_fail
///   use genred::genred;
///
///   let r = genred!("Sum_Reduction(x*z,1)", "x=Vx(0,1)", "y=Vy(1,1)");
///   ```
#[proc_macro_error]
#[proc_macro]
pub fn genred(input: TokenStream) -> TokenStream {
    genred2(input.into()).into()
}

fn genred2(input: TokenStream2) -> TokenStream2 {
    let (text, aliases) = parse(input);
    if let Err(e) = Formula::parse(&text, &aliases) {
        abort_call_site!("{}", e);
    }
    quote! {
        {
            let aliases: &[&str] = &[#(#aliases),*];
            match ::genred::Reduction::parse(#text, aliases, ::genred::Backend::Auto) {
                Ok(reduction) => reduction,
                Err(e) => unreachable!("formula checked while compiling: {}", e),
            }
        }
    }
}

fn parse(input: TokenStream2) -> (String, Vec<String>) {
    let parser = syn::punctuated::Punctuated::<syn::Expr, syn::Token![,]>::parse_terminated;
    let args = match parser.parse2(input) {
        Ok(args) => args,
        Err(e) => abort_call_site!("Invalid input for genred!: {}", e),
    };
    let mut literals = Vec::new();
    for arg in args {
        match arg {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                attrs: _,
            }) => literals.push(lit.value()),
            _ => abort_call_site!("genred! takes string literals only"),
        }
    }
    if literals.is_empty() {
        abort_call_site!("genred! must start with the reduction string literal");
    }
    let text = literals.remove(0);
    (text, literals)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse() {
        let input =
            TokenStream2::from_str(r#""Sum_Reduction(x*y,1)", "x=Vx(0,1)", "y=Vy(1,1)","#)
                .unwrap();
        let (text, aliases) = parse(input);
        assert_eq!(text, "Sum_Reduction(x*y,1)");
        assert_eq!(aliases, vec!["x=Vx(0,1)", "y=Vy(1,1)"]);
    }

    #[test]
    fn test_expansion() {
        let input =
            TokenStream2::from_str(r#""Sum_Reduction(x*y,1)", "x=Vx(0,1)", "y=Vy(1,1)""#)
                .unwrap();
        let expanded = genred2(input).to_string();
        assert!(expanded.contains("Reduction"));
        assert!(expanded.contains("Auto"));
        assert!(expanded.contains(r#""Sum_Reduction(x*y,1)""#));
        assert!(expanded.contains(r#""x=Vx(0,1)""#));
    }

    #[test]
    fn test_error_text() {
        let e = Formula::parse("Sum_Reduction(x,1)", &["x=Vx(0,1)", "x=Vy(1,1)"]).unwrap_err();
        insta::assert_snapshot!(e, @"Alias name `x` is declared more than once");
    }
}
