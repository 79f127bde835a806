mod common;

use common::*;
use genred::{generic_logsumexp, generic_sum, Arg, Backend, Reduction};
use ndarray::{array, Array2};

const H: f64 = 1e-6;

fn loss(r: &Reduction, args: &[Array2<f64>], g: &Array2<f64>) -> f64 {
    let views: Vec<Arg> = args.iter().map(Arg::from).collect();
    (r.call(&views).unwrap() * g).sum()
}

/// Compare the vector-Jacobian product with central differences of `<g, r(args)>`
fn check_gradient(r: &Reduction, args: &[Array2<f64>], name: &str, seed: u64) {
    let views: Vec<Arg> = args.iter().map(Arg::from).collect();
    let out = r.call(&views).unwrap();
    let g = random(&mut rng(seed), out.dim());
    let grad = r.vjp(name, &views, (&g).into()).unwrap();

    let index = r.formula().names.get(name).unwrap().index;
    let mut numeric = Array2::zeros(args[index].dim());
    for ((row, col), value) in numeric.indexed_iter_mut() {
        let mut plus = args.to_vec();
        plus[index][[row, col]] += H;
        let mut minus = args.to_vec();
        minus[index][[row, col]] -= H;
        *value = (loss(r, &plus, &g) - loss(r, &minus, &g)) / (2.0 * H);
    }
    assert_close(&grad, &numeric, 1e-5);
}

#[test]
fn gaussian_kernel() {
    let mut rng = rng(10);
    let p = array![[0.7]];
    let x = random(&mut rng, (5, 3));
    let y = random(&mut rng, (7, 3));
    let b = random(&mut rng, (7, 2));
    let args = [p, x, y, b];
    let r = generic_sum(
        "Exp(-p*SqDist(x,y))*b",
        &["p=Pm(0,1)", "x=Vx(1,3)", "y=Vy(2,3)", "b=Vy(3,2)"],
        1,
        "auto",
    )
    .unwrap();
    for (k, name) in ["p", "x", "y", "b"].iter().enumerate() {
        check_gradient(&r, &args, name, k as u64);
    }
}

#[test]
fn reduction_over_i() {
    let mut rng = rng(11);
    let x = random(&mut rng, (6, 2));
    let y = random(&mut rng, (4, 2));
    let a = random(&mut rng, (6, 1));
    let args = [x, y, a];
    let r = generic_sum(
        "Square(x-y)*Sin(a)+Inv(1+SqNorm2(x))",
        &["x=Vx(0,2)", "y=Vy(1,2)", "a=Vx(2,1)"],
        0,
        "auto",
    )
    .unwrap();
    for name in ["x", "y", "a"] {
        check_gradient(&r, &args, name, 3);
    }
}

#[test]
fn logsumexp() {
    let mut rng = rng(12);
    let x = random(&mut rng, (4, 2));
    let y = random(&mut rng, (9, 2));
    let b = random(&mut rng, (9, 1));
    let args = [x, y, b];
    let r = generic_logsumexp(
        "-SqDist(x,y)+b",
        &["x=Vx(0,2)", "y=Vy(1,2)", "b=Vy(2,1)"],
        1,
        "auto",
    )
    .unwrap();
    for name in ["x", "y", "b"] {
        check_gradient(&r, &args, name, 4);
    }
}

#[test]
fn matrix_operations() {
    let mut rng = rng(13);
    let m = random(&mut rng, (1, 6));
    let x = random(&mut rng, (3, 3));
    let y = random(&mut rng, (5, 2));
    let args = [m, x, y];
    let r = generic_sum(
        "MatVecMult(m,x)*Exp(-SqNorm2(y))+TensorProd(y,Elem(x,0))",
        &["m=Pm(0,6)", "x=Vx(1,3)", "y=Vy(2,2)"],
        1,
        "auto",
    )
    .unwrap();
    for name in ["m", "x", "y"] {
        check_gradient(&r, &args, name, 5);
    }
}

#[test]
fn clamp_away_from_bounds() {
    let x = array![[0.3], [-0.2], [2.5]];
    let y = array![[0.1], [-2.0]];
    let args = [x, y];
    let r = generic_sum(
        "Clamp(x-y,-1,1)*x",
        &["x=Vx(0,1)", "y=Vy(1,1)"],
        1,
        "auto",
    )
    .unwrap();
    check_gradient(&r, &args, "x", 6);
    check_gradient(&r, &args, "y", 7);
}

#[test]
fn clamp_at_bounds() {
    // the bounds count as unclamped, so dc/dx = y there
    let x = array![[1.0], [-1.0]];
    let y = array![[1.0]];
    let g = array![[1.0], [1.0]];
    let r = generic_sum(
        "Exp(-Square(Sum(Clamp(x*y,-1,1))))",
        &["x=Vx(0,1)", "y=Vy(1,1)"],
        1,
        "auto",
    )
    .unwrap();
    let dx = r.vjp("x", &[(&x).into(), (&y).into()], (&g).into()).unwrap();
    let e = (-1.0f64).exp();
    assert_close(&dx, &array![[-2.0 * e], [2.0 * e]], 1e-12);
}

#[test]
fn pow_zero_is_constant() {
    let x = array![[0.0], [1.5]];
    let y = array![[2.0], [-1.0]];
    let g = array![[1.0], [1.0]];
    let r = generic_sum("Pow(x,0)*y", &["x=Vx(0,1)", "y=Vy(1,1)"], 1, "auto").unwrap();
    let args: [Arg; 2] = [(&x).into(), (&y).into()];
    assert_eq!(r.call(&args).unwrap(), array![[1.0], [1.0]]);
    assert_eq!(r.vjp("x", &args, (&g).into()).unwrap(), array![[0.0], [0.0]]);
}

#[test]
fn tiled_gradients_agree() {
    let mut rng = rng(14);
    let x = random(&mut rng, (11, 2));
    let y = random(&mut rng, (13, 2));
    let b = random(&mut rng, (13, 1));
    let g = random(&mut rng, (11, 1));
    let args: [Arg; 3] = [(&x).into(), (&y).into(), (&b).into()];
    let r = generic_logsumexp(
        "-SqDist(x,y)+b",
        &["x=Vx(0,2)", "y=Vy(1,2)", "b=Vy(2,1)"],
        1,
        "dense",
    )
    .unwrap();
    let tiled = with_planner(&r.with_backend(Backend::DoubleTiled), small_tiles());
    for name in ["x", "y", "b"] {
        let expected = r.vjp(name, &args, (&g).into()).unwrap();
        let actual = tiled.vjp(name, &args, (&g).into()).unwrap();
        assert_close(&actual, &expected, 1e-10);
    }
}

#[test]
fn second_order() {
    // the gradient is a reduction again, and can be differentiated
    let x = array![[0.5], [1.5]];
    let y = array![[1.0], [2.0], [-1.0]];
    let g = array![[1.0], [1.0]];
    let r = generic_sum("Square(x-y)", &["x=Vx(0,1)", "y=Vy(1,1)"], 1, "auto").unwrap();
    let dx = r.grad("x").unwrap();
    let args: [Arg; 3] = [(&x).into(), (&y).into(), (&g).into()];
    // d/dx sum_j 2 (x - y_j) g = 2 N g
    let ones = array![[1.0], [1.0]];
    let ddx = dx.reduction().vjp("x", &args, (&ones).into()).unwrap();
    assert_eq!(ddx, array![[6.0], [6.0]]);
}
