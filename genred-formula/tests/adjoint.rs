use genred_formula::*;
use maplit::btreeset;
use std::collections::BTreeSet;

fn symbol_names(f: &Formula) -> BTreeSet<String> {
    f.expr.symbols().into_iter().map(|s| s.name).collect()
}

#[test]
fn square_distance() -> anyhow::Result<()> {
    let f = Formula::parse("Sum_Reduction(Square(x-y),1)", &["x=Vx(0,1)", "y=Vy(1,1)"])?;
    let adj = f.adjoint("x")?;
    insta::assert_snapshot!(adj.formula, @"Sum_Reduction(G_out*(2*(x-y)),1)");
    assert_eq!(adj.cotangent.index, 2);
    assert_eq!(adj.cotangent.role, Role::Row);
    Ok(())
}

#[test]
fn gaussian_sum() -> anyhow::Result<()> {
    let f = Formula::parse(
        "Sum_Reduction(Exp(-SqDist(x,y))*b,1)",
        &["x=Vx(0,3)", "y=Vy(1,3)", "b=Vy(2,1)"],
    )?;

    let adj = f.adjoint("b")?;
    insta::assert_snapshot!(adj.formula, @"Sum_Reduction(G_out*Exp(-SqNorm2(x-y)),0)");
    assert_eq!(
        symbol_names(&adj.formula),
        btreeset! {"x".to_string(), "y".to_string(), "G_out".to_string()}
    );

    let adj = f.adjoint("x")?;
    insta::assert_snapshot!(
        adj.formula,
        @"Sum_Reduction(2*-(G_out*b*Exp(-SqNorm2(x-y)))*(x-y),1)"
    );
    assert_eq!(adj.formula.dim(), 3);
    Ok(())
}

#[test]
fn logsumexp() -> anyhow::Result<()> {
    let f = Formula::parse(
        "LogSumExp_Reduction(-SqDist(x,y),1)",
        &["x=Vx(0,1)", "y=Vy(1,1)"],
    )?;
    let adj = f.adjoint("x")?;
    insta::assert_snapshot!(
        adj.formula,
        @"Sum_Reduction(2*-(Exp(-SqNorm2(x-y)-F_out)*G_out)*(x-y),1)"
    );
    assert_eq!(
        symbol_names(&adj.formula),
        btreeset! {
            "x".to_string(),
            "y".to_string(),
            "F_out".to_string(),
            "G_out".to_string()
        }
    );
    Ok(())
}

#[test]
fn adjoint_reparses() -> anyhow::Result<()> {
    let aliases = ["p=Pm(0,2)", "x=Vx(1,3)", "y=Vy(2,3)"];
    let f = Formula::parse(
        "Sum_Reduction(Pow((x|y),2)*((Elem(p,0)*x)+(Elem(p,1)*y)),1)",
        &aliases,
    )?;
    for name in ["p", "x", "y"] {
        let adj = f.adjoint(name)?;
        let again = Formula::parse(&adj.formula.to_string(), &adj.formula.aliases())?;
        assert_eq!(again, adj.formula);
        assert_eq!(adj.formula.dim(), f.names.get(name).map(|s| s.dim).unwrap());
    }
    Ok(())
}

#[test]
fn second_order() -> anyhow::Result<()> {
    let f = Formula::parse("Sum_Reduction(Exp(x*y),1)", &["x=Vx(0,1)", "y=Vy(1,1)"])?;
    let first = f.adjoint("y")?;
    let second = first.formula.adjoint("x")?;
    // cotangent of the second pass is indexed by j like the first adjoint's output
    assert_eq!(second.cotangent.role, Role::Col);
    assert_eq!(second.cotangent.name, "G_out_");
    assert_eq!(second.formula.num_args(), 4);
    Ok(())
}

#[test]
fn parse_errors_report_position() {
    let aliases = ["x=Vx(0,3)", "y=Vy(1,3)"];
    let cases = [
        ("Sum_Reduction(x+*y,1)", 16),
        ("Sum_Reduction(Exp(x)+z,1)", 21),
        ("Sum_Reduction(Foo(x),1)", 14),
        ("Sum_Reduction(Exp(x,y),1)", 14),
    ];
    for (text, expected) in cases {
        match Formula::parse(text, &aliases) {
            Err(Error::Parse { position, .. }) => assert_eq!(position, expected, "{}", text),
            other => panic!("{}: {:?}", text, other),
        }
    }
}

#[test]
fn alias_errors() {
    assert!(matches!(
        Formula::parse("Sum_Reduction(x,1)", &["x=Vx(0,3)", "x=Vy(1,3)"]),
        Err(Error::DuplicateAlias(_))
    ));
    assert!(matches!(
        Formula::parse("Sum_Reduction(x,1)", &["x=Vx(0,3)", "y=Vy(0,3)"]),
        Err(Error::IndexConflict { index: 0, .. })
    ));
    assert!(matches!(
        Formula::parse("Sum_Reduction(x,1)", &["x=Vk(0,3)"]),
        Err(Error::AliasSyntax { .. })
    ));
    assert!(matches!(
        Formula::parse("Sum_Reduction(x+y,1)", &["x=Vx(0,3)", "y=Vy(1,2)"]),
        Err(Error::DimensionMismatch { .. })
    ));
}
