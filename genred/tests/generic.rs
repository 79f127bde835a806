mod common;

use common::*;
use genred::{generic_logsumexp, generic_sum, reduce, Arg, Backend, Error, ReductionOp};
use ndarray::{array, Array2};

const BACKENDS: [Backend; 5] = [
    Backend::Auto,
    Backend::Dense,
    Backend::RowTiled,
    Backend::ColTiled,
    Backend::DoubleTiled,
];

#[test]
fn sum_matches_loops() {
    let mut rng = rng(0);
    let (m, n) = (6, 10);
    let p = array![[0.25]];
    let a = random(&mut rng, (n, 1));
    let x = random(&mut rng, (m, 3));
    let y = random(&mut rng, (n, 3));

    let mut expected = Array2::zeros((m, 3));
    for i in 0..m {
        for j in 0..n {
            let w = (p[[0, 0]] - a[[j, 0]]).powi(2);
            for k in 0..3 {
                expected[[i, k]] += w * (x[[i, k]] + y[[j, k]]).exp();
            }
        }
    }

    let r = generic_sum(
        "Square(p-a)*Exp(x+y)",
        &["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,3)", "y=Vy(3,3)"],
        1,
        "auto",
    )
    .unwrap();
    let args: [Arg; 4] = [(&p).into(), (&a).into(), (&x).into(), (&y).into()];
    for backend in BACKENDS {
        let r = with_planner(&r.with_backend(backend), small_tiles());
        assert_close(&r.call(&args).unwrap(), &expected, 1e-6);
    }
}

#[test]
fn polynomial_kernel() {
    let mut rng = rng(1);
    let (m, n) = (9, 5);
    let p = array![[0.5, -2.0]];
    let x = random(&mut rng, (m, 3));
    let y = random(&mut rng, (n, 3));

    let mut expected = Array2::zeros((n, 3));
    for j in 0..n {
        for i in 0..m {
            let dot = x.row(i).dot(&y.row(j));
            for k in 0..3 {
                expected[[j, k]] += dot * dot * (p[[0, 0]] * x[[i, k]] + p[[0, 1]] * y[[j, k]]);
            }
        }
    }

    let r = generic_sum(
        "Pow((X|Y),2)*((Elem(P,0)*X)+(Elem(P,1)*Y))",
        &["P=Pm(0,2)", "X=Vx(1,3)", "Y=Vy(2,3)"],
        0,
        "auto",
    )
    .unwrap();
    let args: [Arg; 3] = [(&p).into(), (&x).into(), (&y).into()];
    for backend in BACKENDS {
        let r = with_planner(&r.with_backend(backend), small_tiles());
        assert_close(&r.call(&args).unwrap(), &expected, 1e-10);
    }
}

#[test]
fn clamp_boundaries() {
    let r = generic_sum(
        "Clamp(x-y,-1,1)",
        &["x=Vx(0,1)", "y=Vy(1,1)"],
        1,
        "double-tiled",
    )
    .unwrap();
    // differences -2, -1, 0, 1 and 2 hit both bounds exactly
    let x = array![[0.0]];
    let y = array![[2.0], [1.0], [0.0], [-1.0], [-2.0]];
    let out = r.call(&[(&x).into(), (&y).into()]).unwrap();
    assert_eq!(out, array![[0.0]]);

    let r = reduce(
        ReductionOp::Max,
        "Clamp(x-y,-1,1)",
        &["x=Vx(0,1)", "y=Vy(1,1)"],
        0,
        "dense",
    )
    .unwrap();
    let out = r.call(&[(&x).into(), (&y).into()]).unwrap();
    assert_eq!(out, array![[-1.0], [-1.0], [0.0], [1.0], [1.0]]);
}

#[test]
fn logsumexp_does_not_overflow() {
    let r = generic_logsumexp("x*y", &["x=Vx(0,1)", "y=Vy(1,1)"], 1, "auto").unwrap();
    let x = array![[100.0], [-100.0]];
    let y = array![[10.0], [10.0], [9.0]];
    let expected = array![
        [1000.0 + (2.0 + (-100.0f64).exp()).ln()],
        [-900.0 + (1.0 + 2.0 * (-100.0f64).exp()).ln()]
    ];
    let args: [Arg; 2] = [(&x).into(), (&y).into()];
    for backend in BACKENDS {
        let r = with_planner(&r.with_backend(backend), small_tiles());
        let out = r.call(&args).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        assert_close(&out, &expected, 1e-12);
    }
}

#[test]
fn argmin_is_nearest_neighbour() {
    let r = reduce(
        ReductionOp::ArgMin,
        "SqDist(x,y)",
        &["x=Vx(0,2)", "y=Vy(1,2)"],
        1,
        "double-tiled",
    )
    .unwrap();
    let x = array![[0.0, 0.0], [5.0, 5.0], [1.0, 1.1]];
    let y = array![[1.0, 1.0], [4.0, 4.0], [0.1, 0.0], [1.0, 1.0]];
    let r = with_planner(&r, small_tiles());
    let out = r.call(&[(&x).into(), (&y).into()]).unwrap();
    // y_0 and y_3 tie for x_2, the smaller index wins
    assert_eq!(out, array![[2.0], [1.0], [0.0]]);
}

#[test]
fn empty_axis() {
    let x = Array2::<f64>::zeros((3, 2));
    let y = Array2::<f64>::zeros((0, 2));
    let aliases = ["x=Vx(0,2)", "y=Vy(1,2)"];
    let args: [Arg; 2] = [(&x).into(), (&y).into()];
    for backend in ["dense", "double-tiled"] {
        let sum = generic_sum("x-y", &aliases, 1, backend).unwrap();
        assert_eq!(sum.call(&args).unwrap(), Array2::zeros((3, 2)));
        let lse = generic_logsumexp("(x|y)", &aliases, 1, backend).unwrap();
        assert_eq!(
            lse.call(&args).unwrap(),
            Array2::from_elem((3, 1), f64::NEG_INFINITY)
        );
        // reducing over the non-empty axis gives no rows
        let over_i = generic_sum("x-y", &aliases, 0, backend).unwrap();
        assert_eq!(over_i.call(&args).unwrap().dim(), (0, 2));
    }
}

#[test]
fn errors() {
    let aliases = ["x=Vx(0,1)", "y=Vy(1,1)"];
    assert_eq!(
        generic_sum("x*y", &aliases, 1, "gpu").unwrap_err(),
        Error::UnsupportedBackend("gpu".to_string())
    );
    assert_eq!(
        generic_sum("x*y", &aliases, 2, "auto").unwrap_err(),
        Error::InvalidAxis(2)
    );
    assert!(matches!(
        generic_sum("x+Vx(0,2)", &aliases, 1, "auto"),
        Err(Error::IndexConflict { index: 0, .. })
    ));

    let r = generic_sum("x*y", &aliases, 1, "auto").unwrap();
    let x = array![[1.0, 2.0]];
    let y = array![[1.0]];
    assert!(matches!(
        r.call(&[(&x).into(), (&y).into()]),
        Err(Error::ShapeBinding { symbol, .. }) if symbol == "x"
    ));
    assert!(matches!(
        r.call(&[(&y).into()]),
        Err(Error::ShapeBinding { .. })
    ));

    let r = reduce(ReductionOp::Max, "x*y", &aliases, 1, "auto").unwrap();
    assert!(matches!(
        r.grad("x"),
        Err(Error::NotDifferentiable { symbol, .. }) if symbol == "x"
    ));
}
