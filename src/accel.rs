use arrayvec::ArrayVec;
use bumpalo::Bump;
use partition::partition;

use crate::bounds::Bounds3f;
use crate::geom::Ray;
use crate::{Float, Point3f};

const MAX_ITEMS_PER_LEAF: usize = 4;
const SAH_BINS: usize = 12;
const SAH_TRAVERSAL_COST: Float = 0.125;

#[derive(Copy, Clone)]
pub enum SplitMethod {
    Middle,
    Sah,
}

/// One intersectable unit: a face of a primitive's shape.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ItemRef {
    pub prim: u32,
    pub face: u32,
}

/// Bounding-volume hierarchy over scene items, stored as a flattened node
/// array in depth-first order.
pub struct Bvh {
    items: Vec<ItemRef>,
    nodes: Vec<LinearNode>,
    bounds: Bounds3f,
}

impl Bvh {
    pub fn build(items: Vec<(ItemRef, Bounds3f)>, split_method: SplitMethod) -> Self {
        if items.is_empty() {
            return Bvh {
                items: Vec::new(),
                nodes: Vec::new(),
                bounds: Bounds3f::empty(),
            };
        }

        let mut item_info: Vec<ItemInfo> = items
            .iter()
            .map(|&(item, bounds)| ItemInfo {
                item,
                bounds,
                centroid: bounds.centroid(),
            })
            .collect();

        let arena = Bump::new();
        let mut ordered: Vec<ItemRef> = Vec::with_capacity(items.len());

        let root = Self::recursive_build(&arena, &mut item_info, &mut ordered, split_method);
        let bounds = root.bounds();

        let mut nodes = Vec::with_capacity(2 * items.len());
        Self::flatten(&mut nodes, root);

        Bvh {
            items: ordered,
            nodes,
            bounds,
        }
    }

    pub fn bounds(&self) -> Bounds3f {
        self.bounds
    }

    fn recursive_build<'a>(
        arena: &'a Bump,
        item_info: &mut [ItemInfo],
        ordered: &mut Vec<ItemRef>,
        split_method: SplitMethod,
    ) -> &'a BuildNode<'a> {
        let (node_bounds, centroid_bounds) = item_info.iter().fold(
            (Bounds3f::empty(), Bounds3f::empty()),
            |(nb, cb), info| (nb.join(&info.bounds), cb.join_point(info.centroid)),
        );

        let n_items = item_info.len();

        // all centroids on one point cannot be partitioned
        if n_items == 1 || centroid_bounds.is_point() {
            return arena.alloc(Self::make_leaf(node_bounds, item_info, ordered));
        }

        let axis = centroid_bounds.maximum_extent();

        let (left, right) = match split_method {
            SplitMethod::Middle => {
                let midpoint = 0.5 * (centroid_bounds.min[axis] + centroid_bounds.max[axis]);
                let (left, right) = partition(item_info, |info| info.centroid[axis] < midpoint);
                if left.is_empty() || right.is_empty() {
                    Self::partition_equal_counts(item_info, axis)
                } else {
                    (left, right)
                }
            }
            SplitMethod::Sah => {
                match Self::find_sah_split(item_info, &centroid_bounds, &node_bounds, axis) {
                    SahDecision::Leaf if n_items <= MAX_ITEMS_PER_LEAF => {
                        return arena.alloc(Self::make_leaf(node_bounds, item_info, ordered));
                    }
                    SahDecision::Leaf => Self::partition_equal_counts(item_info, axis),
                    SahDecision::Split(bin) => {
                        let (left, right) = partition(item_info, |info| {
                            Self::bin_of(&centroid_bounds, axis, info.centroid) <= bin
                        });
                        if left.is_empty() || right.is_empty() {
                            Self::partition_equal_counts(item_info, axis)
                        } else {
                            (left, right)
                        }
                    }
                }
            }
        };

        let child1 = Self::recursive_build(arena, left, ordered, split_method);
        let child2 = Self::recursive_build(arena, right, ordered, split_method);
        arena.alloc(BuildNode::interior([child1, child2], axis as u8))
    }

    fn make_leaf(bounds: Bounds3f, item_info: &[ItemInfo], ordered: &mut Vec<ItemRef>) -> BuildNode<'static> {
        let first = ordered.len() as u32;
        for info in item_info {
            ordered.push(info.item);
        }
        BuildNode::Leaf {
            bounds,
            first,
            count: item_info.len() as u16,
        }
    }

    fn partition_equal_counts(
        item_info: &mut [ItemInfo],
        axis: usize,
    ) -> (&mut [ItemInfo], &mut [ItemInfo]) {
        let mid = item_info.len() / 2;
        item_info.select_nth_unstable_by(mid, |a, b| {
            a.centroid[axis].partial_cmp(&b.centroid[axis]).unwrap()
        });
        item_info.split_at_mut(mid)
    }

    fn bin_of(centroid_bounds: &Bounds3f, axis: usize, centroid: Point3f) -> usize {
        let offset = centroid_bounds.offset(centroid)[axis];
        ((offset * SAH_BINS as Float) as usize).min(SAH_BINS - 1)
    }

    fn find_sah_split(
        item_info: &[ItemInfo],
        centroid_bounds: &Bounds3f,
        node_bounds: &Bounds3f,
        axis: usize,
    ) -> SahDecision {
        let mut bin_counts = [0usize; SAH_BINS];
        let mut bin_bounds = [Bounds3f::empty(); SAH_BINS];
        for info in item_info {
            let b = Self::bin_of(centroid_bounds, axis, info.centroid);
            bin_counts[b] += 1;
            bin_bounds[b] = bin_bounds[b].join(&info.bounds);
        }

        // cost of splitting after each bin boundary
        let mut best_bin = 0;
        let mut best_cost = Float::INFINITY;
        for split in 0..SAH_BINS - 1 {
            let (mut lb, mut rb) = (Bounds3f::empty(), Bounds3f::empty());
            let (mut lc, mut rc) = (0usize, 0usize);
            for b in 0..=split {
                lb = lb.join(&bin_bounds[b]);
                lc += bin_counts[b];
            }
            for b in split + 1..SAH_BINS {
                rb = rb.join(&bin_bounds[b]);
                rc += bin_counts[b];
            }
            if lc == 0 || rc == 0 {
                continue;
            }
            let cost = SAH_TRAVERSAL_COST
                + (lc as Float * lb.surface_area() + rc as Float * rb.surface_area())
                    / node_bounds.surface_area().max(1e-12);
            if cost < best_cost {
                best_cost = cost;
                best_bin = split;
            }
        }

        let leaf_cost = item_info.len() as Float;
        if best_cost < leaf_cost {
            SahDecision::Split(best_bin)
        } else {
            SahDecision::Leaf
        }
    }

    // Returns subtree length
    fn flatten(nodes: &mut Vec<LinearNode>, node: &BuildNode) -> usize {
        match *node {
            BuildNode::Leaf {
                bounds,
                first,
                count,
            } => {
                nodes.push(LinearNode {
                    bounds,
                    kind: LinearNodeKind::Leaf { first, count },
                });
                1
            }
            BuildNode::Interior {
                bounds,
                children,
                split_axis,
            } => {
                nodes.push(LinearNode {
                    bounds,
                    kind: LinearNodeKind::Interior {
                        second_child: 0,
                        split_axis,
                    },
                });
                let my_idx = nodes.len() - 1;
                let first_len = Self::flatten(nodes, children[0]);
                let second_idx = my_idx + first_len + 1;
                if let LinearNodeKind::Interior {
                    ref mut second_child,
                    ..
                } = nodes[my_idx].kind
                {
                    *second_child = second_idx as u32;
                } else {
                    unreachable!()
                }
                let second_len = Self::flatten(nodes, children[1]);
                first_len + second_len + 1
            }
        }
    }

    /// Walk the tree, calling `intersect_item` for every item whose node the
    /// ray touches. The callback returns the hit parameter so traversal can
    /// shrink the ray interval; the closest accepted item is returned.
    pub fn intersect<F>(
        &self,
        ray: &Ray,
        tmin: Float,
        mut tmax: Float,
        mut intersect_item: F,
    ) -> Option<ItemRef>
    where
        F: FnMut(ItemRef, Float, Float) -> Option<Float>,
    {
        if self.nodes.is_empty() || tmin > tmax {
            return None;
        }

        let dir_is_neg = [ray.d.x < 0.0, ray.d.y < 0.0, ray.d.z < 0.0];
        let mut to_visit = ArrayVec::<usize, 64>::new();
        let mut current = 0usize;
        let mut best = None;

        loop {
            let node = &self.nodes[current];
            if node.bounds.intersect_test(ray, tmin, tmax) {
                match node.kind {
                    LinearNodeKind::Leaf { first, count } => {
                        for i in 0..count as usize {
                            let item = self.items[first as usize + i];
                            if let Some(t) = intersect_item(item, tmin, tmax) {
                                tmax = t;
                                best = Some(item);
                            }
                        }
                        match to_visit.pop() {
                            Some(next) => current = next,
                            None => break,
                        }
                    }
                    LinearNodeKind::Interior {
                        second_child,
                        split_axis,
                    } => {
                        // visit the near child first
                        if dir_is_neg[split_axis as usize] {
                            to_visit.push(current + 1);
                            current = second_child as usize;
                        } else {
                            to_visit.push(second_child as usize);
                            current += 1;
                        }
                    }
                }
            } else {
                match to_visit.pop() {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }

        best
    }

    /// Any-hit query for shadow rays.
    pub fn intersect_test<F>(&self, ray: &Ray, tmin: Float, tmax: Float, mut test_item: F) -> bool
    where
        F: FnMut(ItemRef, Float, Float) -> bool,
    {
        if self.nodes.is_empty() || tmin > tmax {
            return false;
        }

        let dir_is_neg = [ray.d.x < 0.0, ray.d.y < 0.0, ray.d.z < 0.0];
        let mut to_visit = ArrayVec::<usize, 64>::new();
        let mut current = 0usize;

        loop {
            let node = &self.nodes[current];
            if node.bounds.intersect_test(ray, tmin, tmax) {
                match node.kind {
                    LinearNodeKind::Leaf { first, count } => {
                        for i in 0..count as usize {
                            if test_item(self.items[first as usize + i], tmin, tmax) {
                                return true;
                            }
                        }
                        match to_visit.pop() {
                            Some(next) => current = next,
                            None => break,
                        }
                    }
                    LinearNodeKind::Interior {
                        second_child,
                        split_axis,
                    } => {
                        if dir_is_neg[split_axis as usize] {
                            to_visit.push(current + 1);
                            current = second_child as usize;
                        } else {
                            to_visit.push(second_child as usize);
                            current += 1;
                        }
                    }
                }
            } else {
                match to_visit.pop() {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }

        false
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct LinearNode {
    bounds: Bounds3f,
    kind: LinearNodeKind,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum LinearNodeKind {
    Leaf { first: u32, count: u16 },
    Interior { second_child: u32, split_axis: u8 },
}

struct ItemInfo {
    item: ItemRef,
    bounds: Bounds3f,
    centroid: Point3f,
}

enum SahDecision {
    Leaf,
    Split(usize),
}

enum BuildNode<'a> {
    Leaf {
        bounds: Bounds3f,
        first: u32,
        count: u16,
    },
    Interior {
        bounds: Bounds3f,
        children: [&'a BuildNode<'a>; 2],
        split_axis: u8,
    },
}

impl<'a> BuildNode<'a> {
    fn interior(children: [&'a BuildNode<'a>; 2], split_axis: u8) -> Self {
        let bounds = children[0].bounds().join(&children[1].bounds());
        BuildNode::Interior {
            bounds,
            children,
            split_axis,
        }
    }

    fn bounds(&self) -> Bounds3f {
        match self {
            BuildNode::Leaf { bounds, .. } => *bounds,
            BuildNode::Interior { bounds, .. } => *bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Rng;
    use crate::shape::Sphere;
    use crate::{Point3f, Vec3f};
    use cgmath::InnerSpace;
    use pretty_assertions as pa;

    fn sphere_cloud(n: usize, seed: u64) -> Vec<Sphere> {
        let mut rng = Rng::with_seed(seed);
        (0..n)
            .map(|_| {
                let c = Point3f::new(
                    rng.u() * 20.0 - 10.0,
                    rng.u() * 20.0 - 10.0,
                    rng.u() * 20.0 - 10.0,
                );
                Sphere::new(c, 0.5 + rng.u() * 2.0).unwrap()
            })
            .collect()
    }

    fn build_over(spheres: &[Sphere], method: SplitMethod) -> Bvh {
        let items = spheres
            .iter()
            .enumerate()
            .map(|(i, s)| {
                (
                    ItemRef {
                        prim: i as u32,
                        face: 0,
                    },
                    s.bounds(),
                )
            })
            .collect();
        Bvh::build(items, method)
    }

    #[test]
    fn empty_tree_never_hits() {
        let bvh = Bvh::build(Vec::new(), SplitMethod::Middle);
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, 0.0),
            d: Vec3f::new(0.0, 0.0, 1.0),
        };
        assert_eq!(bvh.intersect(&ray, 0.0, 100.0, |_, _, _| Some(1.0)), None);
        assert!(!bvh.intersect_test(&ray, 0.0, 100.0, |_, _, _| true));
    }

    #[test]
    fn two_item_tree_shape() {
        let a = Bounds3f::with_bounds(Point3f::new(1.0, 1.0, 1.0), Point3f::new(2.0, 2.0, 2.0));
        let b = Bounds3f::with_bounds(Point3f::new(1.0, -2.0, 1.0), Point3f::new(2.0, -1.0, 2.0));
        let bvh = Bvh::build(
            vec![
                (ItemRef { prim: 0, face: 0 }, a),
                (ItemRef { prim: 1, face: 0 }, b),
            ],
            SplitMethod::Middle,
        );
        pa::assert_eq!(bvh.nodes.len(), 3);
        pa::assert_eq!(bvh.bounds, a.join(&b));
        // split on y puts the lower item first in depth-first order
        pa::assert_eq!(bvh.items[0], ItemRef { prim: 1, face: 0 });
    }

    #[test]
    fn matches_linear_scan() {
        for &method in &[SplitMethod::Middle, SplitMethod::Sah] {
            let spheres = sphere_cloud(100, 3);
            let bvh = build_over(&spheres, method);

            let mut rng = Rng::with_seed(17);
            for i in 0..500 {
                let d = crate::math::uniform_sample_sphere(rng.u(), rng.u());
                let ray = Ray {
                    o: Point3f::new(0.0, 0.0, 0.0),
                    d,
                };

                let hit = bvh.intersect(&ray, 1e-4, crate::INFINITY, |item, tmin, tmax| {
                    spheres[item.prim as usize].intersect(&ray, tmin, tmax)
                });
                let hit_test = bvh.intersect_test(&ray, 1e-4, crate::INFINITY, |item, tmin, tmax| {
                    spheres[item.prim as usize]
                        .intersect(&ray, tmin, tmax)
                        .is_some()
                });

                // brute force over the list
                let mut best: Option<(usize, Float)> = None;
                for (j, s) in spheres.iter().enumerate() {
                    let tmax = best.map_or(crate::INFINITY, |(_, t)| t);
                    if let Some(t) = s.intersect(&ray, 1e-4, tmax) {
                        best = Some((j, t));
                    }
                }

                assert_eq!(
                    hit.map(|item| item.prim as usize),
                    best.map(|(j, _)| j),
                    "iteration {}",
                    i
                );
                assert_eq!(hit_test, best.is_some(), "iteration {}", i);
            }
        }
    }

    #[test]
    fn traversal_shrinks_the_interval() {
        // two spheres along +z; the near one must win regardless of order
        let spheres = vec![
            Sphere::new(Point3f::new(0.0, 0.0, 5.0), 1.0).unwrap(),
            Sphere::new(Point3f::new(0.0, 0.0, 10.0), 1.0).unwrap(),
        ];
        let bvh = build_over(&spheres, SplitMethod::Sah);
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, 0.0),
            d: Vec3f::new(0.0, 0.0, 1.0).normalize(),
        };
        let hit = bvh
            .intersect(&ray, 1e-4, crate::INFINITY, |item, tmin, tmax| {
                spheres[item.prim as usize].intersect(&ray, tmin, tmax)
            })
            .unwrap();
        assert_eq!(hit.prim, 0);
    }

    #[test]
    fn inverted_interval_is_a_miss() {
        let spheres = sphere_cloud(10, 5);
        let bvh = build_over(&spheres, SplitMethod::Middle);
        let ray = Ray {
            o: Point3f::new(0.0, 0.0, -50.0),
            d: Vec3f::new(0.0, 0.0, 1.0),
        };
        assert_eq!(
            bvh.intersect(&ray, 10.0, 1.0, |item, tmin, tmax| {
                spheres[item.prim as usize].intersect(&ray, tmin, tmax)
            }),
            None
        );
    }
}
