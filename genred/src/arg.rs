//! Operand binding

use genred_formula::{Axis, Error, Namespace, Result, Role};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis as NdAxis};

/// One bound array, `[rows, dim]`
///
/// One-dimensional arrays are viewed as a single row, which is the usual way to pass a parameter.
#[derive(Debug, Clone)]
pub struct Arg<'a>(ArrayView2<'a, f64>);

impl<'a> Arg<'a> {
    pub fn view(&self) -> ArrayView2<'a, f64> {
        self.0.clone()
    }

    /// Shorten the borrow so arguments from different sources share one lifetime
    pub fn reborrow(&self) -> Arg<'_> {
        Arg(self.0.view())
    }
}

impl<'a> From<ArrayView2<'a, f64>> for Arg<'a> {
    fn from(view: ArrayView2<'a, f64>) -> Self {
        Arg(view)
    }
}

impl<'a> From<&'a Array2<f64>> for Arg<'a> {
    fn from(array: &'a Array2<f64>) -> Self {
        Arg(array.view())
    }
}

impl<'a> From<ArrayView1<'a, f64>> for Arg<'a> {
    fn from(view: ArrayView1<'a, f64>) -> Self {
        Arg(view.insert_axis(NdAxis(0)))
    }
}

impl<'a> From<&'a Array1<f64>> for Arg<'a> {
    fn from(array: &'a Array1<f64>) -> Self {
        Arg(array.view().insert_axis(NdAxis(0)))
    }
}

/// Arguments checked against a symbol table
///
/// `m` is the number of `i` indices, `n` the number of `j` indices.
#[derive(Debug, Clone)]
pub struct Binding<'a> {
    views: Vec<ArrayView2<'a, f64>>,
    pub m: usize,
    pub n: usize,
}

fn consistent(extent: &mut Option<usize>, rows: usize, name: &str, axis: &str) -> Result<()> {
    match *extent {
        Some(e) if e != rows => Err(Error::shape_binding(
            name,
            format!("has {} rows but {} is {} from earlier arguments", rows, axis, e),
        )),
        _ => {
            *extent = Some(rows);
            Ok(())
        }
    }
}

impl<'a> Binding<'a> {
    pub fn new(names: &Namespace, args: &[Arg<'a>]) -> Result<Self> {
        if args.len() != names.num_args() {
            return Err(Error::shape_binding(
                "arguments",
                format!("expected {} arrays, got {}", names.num_args(), args.len()),
            ));
        }
        let (mut m, mut n) = (None, None);
        for symbol in names.symbols() {
            let (rows, dim) = args[symbol.index].0.dim();
            if dim != symbol.dim {
                return Err(Error::shape_binding(
                    &symbol.name,
                    format!("declared dimension {}, got trailing size {}", symbol.dim, dim),
                ));
            }
            match symbol.role {
                Role::Parameter if rows != 1 => {
                    return Err(Error::shape_binding(
                        &symbol.name,
                        format!("a parameter has one row, got {}", rows),
                    ))
                }
                Role::Parameter => {}
                Role::Row => consistent(&mut m, rows, &symbol.name, "M")?,
                Role::Col => consistent(&mut n, rows, &symbol.name, "N")?,
                Role::Output => {
                    return Err(Error::shape_binding(
                        &symbol.name,
                        "output of a reduction cannot be bound",
                    ))
                }
            }
        }
        let m = m.ok_or_else(|| Error::shape_binding("M", "no argument is indexed by i"))?;
        let n = n.ok_or_else(|| Error::shape_binding("N", "no argument is indexed by j"))?;
        Ok(Binding {
            views: args.iter().map(|a| a.view()).collect(),
            m,
            n,
        })
    }

    pub fn view(&self, index: usize) -> &ArrayView2<'a, f64> {
        &self.views[index]
    }

    /// `(outer, inner)` extents when reducing along `axis`
    pub fn extents(&self, axis: Axis) -> (usize, usize) {
        match axis {
            Axis::J => (self.m, self.n),
            Axis::I => (self.n, self.m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn names() -> Namespace {
        Namespace::from_aliases(&["p=Pm(0,2)", "x=Vx(1,3)", "y=Vy(2,3)"]).unwrap()
    }

    #[test]
    fn bind() {
        let p = array![1.0, 2.0];
        let x = Array2::<f64>::zeros((4, 3));
        let y = Array2::<f64>::zeros((5, 3));
        let binding = Binding::new(&names(), &[(&p).into(), (&x).into(), (&y).into()]).unwrap();
        assert_eq!((binding.m, binding.n), (4, 5));
        assert_eq!(binding.extents(Axis::I), (5, 4));
        assert_eq!(binding.view(0).dim(), (1, 2));
    }

    #[test]
    fn reborrow() {
        let x = Array2::<f64>::zeros((4, 3));
        let forward: Vec<Arg> = vec![(&x).into()];
        let p = array![1.0, 2.0];
        let y = Array2::<f64>::zeros((5, 3));
        let mut args: Vec<Arg> = vec![(&p).into()];
        args.extend(forward.iter().map(Arg::reborrow));
        args.push(y.view().into());
        let binding = Binding::new(&names(), &args).unwrap();
        assert_eq!((binding.m, binding.n), (4, 5));
    }

    #[test]
    fn shape_errors() {
        let p = array![1.0, 2.0];
        let x = Array2::<f64>::zeros((4, 3));
        let y = Array2::<f64>::zeros((5, 3));
        let bad_dim = Array2::<f64>::zeros((5, 2));
        let two_rows = Array2::<f64>::zeros((2, 2));

        let cases: Vec<Vec<Arg>> = vec![
            vec![(&p).into(), (&x).into()],
            vec![(&p).into(), (&x).into(), (&bad_dim).into()],
            vec![(&two_rows).into(), (&x).into(), (&y).into()],
        ];
        for args in cases {
            assert!(matches!(
                Binding::new(&names(), &args),
                Err(Error::ShapeBinding { .. })
            ));
        }

        // M disagrees between two row variables
        let names = Namespace::from_aliases(&["x=Vx(0,3)", "z=Vx(1,3)", "y=Vy(2,3)"]).unwrap();
        let err = Binding::new(&names, &[(&x).into(), (&y).into(), (&y).into()]).unwrap_err();
        assert!(matches!(err, Error::ShapeBinding { symbol, .. } if symbol == "z"));
    }

    #[test]
    fn missing_extent() {
        let names = Namespace::from_aliases(&["x=Vx(0,3)"]).unwrap();
        let x = Array2::<f64>::zeros((4, 3));
        assert!(matches!(
            Binding::new(&names, &[(&x).into()]),
            Err(Error::ShapeBinding { symbol, .. }) if symbol == "N"
        ));
    }
}
