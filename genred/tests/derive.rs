use genred::{genred, Arg, Backend};
use ndarray::array;

#[test]
fn checked_formula() -> anyhow::Result<()> {
    let r = genred!(
        "Sum_Reduction(Square(p-a)*Exp(x+y),1)",
        "p=Pm(0,1)",
        "a=Vy(1,1)",
        "x=Vx(2,3)",
        "y=Vy(3,3)"
    );
    assert_eq!(r.backend(), Backend::Auto);
    assert_eq!(r.formula().dim(), 3);

    let p = array![1.0];
    let a = array![[0.0], [2.0]];
    let x = array![[0.0, 0.0, 0.0]];
    let y = array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
    let args: [Arg; 4] = [(&p).into(), (&a).into(), (&x).into(), (&y).into()];
    assert_eq!(r.call(&args)?, array![[2.0, 2.0, 2.0]]);
    Ok(())
}

#[test]
fn inline_variables() -> anyhow::Result<()> {
    let r = genred!("LogSumExp_Reduction(Vi(0,1)*Vj(1,1),0)");
    let x = array![[0.0], [0.0]];
    let y = array![[1.0]];
    let out = r.call(&[(&x).into(), (&y).into()])?;
    assert_eq!(out, array![[2.0f64.ln()]]);
    Ok(())
}
