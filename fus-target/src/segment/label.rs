//! 26-邻域连通域标记.
//!
//! 以行优先线性索引为键的并查集实现, 单次前向扫描 + 单次标号扫描, 不使用递归.
//! 合并时总是让较大的根指向较小的根, 所以每个连通域的根恰是其首个体素
//! (线性索引最小者), 标号顺序也就是首个体素的出现顺序.

use ndarray::{Array3, ArrayView3};

use crate::{Idx3d, PipelineError, PipelineResult};

/// 并查集中表示背景的哨兵值.
const NONE: usize = usize::MAX;

/// 获得 `(x, y, z)` 的 26-邻居中, 行优先线性索引小于自身的 13 个. 不检查越界.
#[inline]
pub(crate) fn backward_neighbour13((x, y, z): Idx3d) -> [Idx3d; 13] {
    let (xp, yp, zp) = (x.wrapping_sub(1), y.wrapping_sub(1), z.wrapping_sub(1));
    let (yn, zn) = (y.saturating_add(1), z.saturating_add(1));
    [
        (xp, yp, zp),
        (xp, yp, z),
        (xp, yp, zn),
        (xp, y, zp),
        (xp, y, z),
        (xp, y, zn),
        (xp, yn, zp),
        (xp, yn, z),
        (xp, yn, zn),
        (x, yp, zp),
        (x, yp, z),
        (x, yp, zn),
        (x, y, zp),
    ]
}

/// 以线性索引为键的并查集. `parent[i] == NONE` 表示 `i` 不是前景.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: vec![NONE; len],
        }
    }

    #[inline]
    fn make_set(&mut self, i: usize) {
        self.parent[i] = i;
    }

    /// 路径减半.
    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            let grand = self.parent[self.parent[i]];
            self.parent[i] = grand;
            i = grand;
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// 单个连通域的统计信息.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Component {
    label: u32,
    voxel_count: usize,
    first_index: usize,
    first_voxel: Idx3d,
    min: [usize; 3],
    max: [usize; 3],
}

impl Component {
    fn new(label: u32, index: usize, (x, y, z): Idx3d) -> Self {
        Self {
            label,
            voxel_count: 0,
            first_index: index,
            first_voxel: (x, y, z),
            min: [x, y, z],
            max: [x, y, z],
        }
    }

    fn push(&mut self, (x, y, z): Idx3d) {
        self.voxel_count += 1;
        for (axis, v) in [x, y, z].into_iter().enumerate() {
            self.min[axis] = self.min[axis].min(v);
            self.max[axis] = self.max[axis].max(v);
        }
    }

    /// 标号, 从 1 开始. 0 保留给背景.
    #[inline]
    pub fn label(&self) -> u32 {
        self.label
    }

    /// 体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// 首个体素的行优先线性索引.
    #[inline]
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    /// 首个体素.
    #[inline]
    pub fn first_voxel(&self) -> Idx3d {
        self.first_voxel
    }

    /// 各轴最小索引 (含).
    #[inline]
    pub fn min(&self) -> [usize; 3] {
        self.min
    }

    /// 各轴最大索引 (含).
    #[inline]
    pub fn max(&self) -> [usize; 3] {
        self.max
    }
}

/// 标号结果. 与掩码同形状, 背景为 0, 连通域按首个体素的线性索引升序编号为 1, 2, ...
#[derive(Clone, Debug)]
pub struct ComponentLabels {
    labels: Vec<u32>,
    dim: Idx3d,
    components: Vec<Component>,
}

impl ComponentLabels {
    /// 连通域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// 是否不存在任何连通域.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// 全部连通域, 按标号升序.
    #[inline]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// 掩码形状.
    #[inline]
    pub fn dim(&self) -> Idx3d {
        self.dim
    }

    /// `pos` 处的标号. 越界时 panic.
    #[inline]
    pub fn label_at(&self, pos: Idx3d) -> u32 {
        self.labels[linear_index(self.dim, pos)]
    }

    /// 体素最多的连通域. 体素数并列时取首个体素最靠前者.
    pub fn largest(&self) -> Option<&Component> {
        self.components.iter().max_by(|a, b| {
            a.voxel_count
                .cmp(&b.voxel_count)
                .then_with(|| b.first_index.cmp(&a.first_index))
        })
    }

    /// 标号为 `label` 的体素掩码.
    pub fn mask_of(&self, label: u32) -> Array3<bool> {
        Array3::from_shape_fn(self.dim, |pos| {
            self.labels[linear_index(self.dim, pos)] == label
        })
    }
}

#[inline]
fn linear_index((_, ny, nz): Idx3d, (x, y, z): Idx3d) -> usize {
    (x * ny + y) * nz + z
}

/// 对前景掩码做 26-邻域连通域标记.
///
/// 扫描顺序为行优先线性索引升序. 对于同一个掩码, 标号结果总是相同的.
pub fn label_components(mask: ArrayView3<'_, bool>) -> PipelineResult<ComponentLabels> {
    let dim = mask.dim();
    let mut set = DisjointSet::new(mask.len());

    // 第一遍: 与已扫描过的前景邻居合并.
    for (i, (pos, _)) in mask.indexed_iter().enumerate().filter(|(_, (_, &p))| p) {
        set.make_set(i);
        for q in backward_neighbour13(pos) {
            // 越界的索引 `get` 返回 `None`.
            if matches!(mask.get(q), Some(&true)) {
                set.union(i, linear_index(dim, q));
            }
        }
    }

    // 第二遍: 按根出现的顺序分配标号. 根总是先于同一连通域的其它体素出现.
    let mut labels = vec![0u32; mask.len()];
    let mut components: Vec<Component> = Vec::new();
    for (i, (pos, _)) in mask.indexed_iter().enumerate().filter(|(_, (_, &p))| p) {
        let root = set.find(i);
        let label = if root == i {
            let label = u32::try_from(components.len() + 1).map_err(|_| {
                PipelineError::invariant("Too many connected components for a u32 label")
                    .with_context("components", components.len() as f64)
            })?;
            components.push(Component::new(label, i, pos));
            label
        } else {
            labels[root]
        };
        labels[i] = label;
        components[label as usize - 1].push(pos);
    }

    Ok(ComponentLabels {
        labels,
        dim,
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::iproduct;
    use ndarray::s;
    use std::collections::VecDeque;

    fn mask_with(dim: usize, voxels: &[Idx3d]) -> Array3<bool> {
        let mut m = Array3::from_elem((dim, dim, dim), false);
        for &p in voxels {
            m[p] = true;
        }
        m
    }

    /// 26-邻域广度优先填充, 返回每个连通域的 `(首个体素, 体素个数)`, 按首个体素的扫描顺序.
    fn flood_fill(mask: &Array3<bool>) -> Vec<(Idx3d, usize)> {
        let mut seen = Array3::from_elem(mask.dim(), false);
        let mut out = Vec::new();
        for (pos, &p) in mask.indexed_iter() {
            if !p || seen[pos] {
                continue;
            }
            seen[pos] = true;
            let mut queue = VecDeque::from([pos]);
            let mut count = 0;
            while let Some((x, y, z)) = queue.pop_front() {
                count += 1;
                for (dx, dy, dz) in iproduct!(0..3usize, 0..3usize, 0..3usize) {
                    let q = (
                        (x + dx).wrapping_sub(1),
                        (y + dy).wrapping_sub(1),
                        (z + dz).wrapping_sub(1),
                    );
                    if matches!(mask.get(q), Some(&true)) && !seen[q] {
                        seen[q] = true;
                        queue.push_back(q);
                    }
                }
            }
            out.push((pos, count));
        }
        out
    }

    #[test]
    fn test_backward_neighbour13() {
        // 3³ 中心的线性索引为 13, 其后向邻居恰好是索引 0..13.
        let dim = (3, 3, 3);
        let mut idx: Vec<_> = backward_neighbour13((1, 1, 1))
            .iter()
            .map(|&p| linear_index(dim, p))
            .collect();
        idx.sort_unstable();
        assert_eq!(idx, (0..13).collect::<Vec<_>>());

        // 原点没有后向邻居.
        let m = Array3::from_elem(dim, true);
        assert!(backward_neighbour13((0, 0, 0)).iter().all(|&p| m.get(p).is_none()));
        // 末行的 `+1` 邻居越界.
        assert!(m.get(backward_neighbour13((1, 2, 2))[8]).is_none());
    }

    #[test]
    fn test_matches_flood_fill() {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        for round in 0..60 {
            let dim = (4 + round % 3, 5, 3 + round % 4);
            let m = Array3::from_shape_fn(dim, |_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (state >> 33) % 10 < 3
            });
            let labels = label_components(m.view()).unwrap();
            let got: Vec<_> = labels
                .components()
                .iter()
                .map(|c| (c.first_voxel(), c.voxel_count()))
                .collect();
            assert_eq!(got, flood_fill(&m), "round {round}");
            for (pos, &p) in m.indexed_iter() {
                assert_eq!(labels.label_at(pos) != 0, p);
            }
        }
    }

    #[test]
    fn test_corner_adjacency_connects() {
        // 仅以顶点相邻.
        let m = mask_with(4, &[(0, 0, 0), (1, 1, 1), (2, 2, 2)]);
        let labels = label_components(m.view()).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.components()[0].voxel_count(), 3);

        // 间隔一个体素则不相连.
        let m = mask_with(4, &[(0, 0, 0), (2, 2, 2)]);
        assert_eq!(label_components(m.view()).unwrap().len(), 2);
    }

    #[test]
    fn test_anti_diagonal_edge_adjacency() {
        // (0, 1, 1) 与 (1, 0, 0) 对应偏移 (-1, 1, 1).
        let m = mask_with(4, &[(0, 1, 1), (1, 0, 0)]);
        let labels = label_components(m.view()).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.label_at((0, 1, 1)), labels.label_at((1, 0, 0)));
    }

    #[test]
    fn test_u_shape_merges_late() {
        // U 形: 两臂在扫描到底部之前看起来是两个连通域.
        let mut m = Array3::from_elem((3, 5, 5), false);
        m.slice_mut(s![.., 0, 0]).fill(true);
        m.slice_mut(s![.., 0, 4]).fill(true);
        m.slice_mut(s![2, 0, ..]).fill(true);
        let labels = label_components(m.view()).unwrap();
        assert_eq!(labels.len(), 1);
        let c = &labels.components()[0];
        assert_eq!(c.voxel_count(), 3 + 3 + 3);
        assert_eq!(c.first_voxel(), (0, 0, 0));
        assert_eq!(c.min(), [0, 0, 0]);
        assert_eq!(c.max(), [2, 0, 4]);
    }

    #[test]
    fn test_labels_follow_scan_order() {
        let m = mask_with(8, &[(5, 5, 5), (0, 7, 7), (3, 0, 0), (5, 5, 6)]);
        let labels = label_components(m.view()).unwrap();
        let firsts: Vec<_> = labels.components().iter().map(|c| c.first_voxel()).collect();
        assert_eq!(firsts, [(0, 7, 7), (3, 0, 0), (5, 5, 5)]);
        assert_eq!(labels.label_at((5, 5, 6)), 3);
        assert_eq!(labels.label_at((1, 1, 1)), 0);
    }

    #[test]
    fn test_largest_tie_break() {
        // 两个等大的连通域, 取首个体素更靠前的那个.
        let mut m = Array3::from_elem((10, 10, 10), false);
        m.slice_mut(s![6..8, 6..8, 6..8]).fill(true);
        m.slice_mut(s![1..3, 1..3, 1..3]).fill(true);
        let labels = label_components(m.view()).unwrap();
        assert_eq!(labels.len(), 2);
        let largest = labels.largest().unwrap();
        assert_eq!(largest.first_voxel(), (1, 1, 1));
        assert_eq!(largest.label(), 1);

        // 较晚出现的连通域只要更大就会被选中.
        m[(8, 8, 8)] = true;
        let labels = label_components(m.view()).unwrap();
        assert_eq!(labels.largest().unwrap().first_voxel(), (6, 6, 6));
    }

    #[test]
    fn test_mask_of() {
        let m = mask_with(6, &[(0, 0, 0), (0, 0, 1), (4, 4, 4)]);
        let labels = label_components(m.view()).unwrap();
        let first = labels.mask_of(1);
        assert_eq!(first.iter().filter(|&&p| p).count(), 2);
        assert!(first[(0, 0, 1)]);
        assert!(!first[(4, 4, 4)]);
        assert_eq!(labels.mask_of(0).iter().filter(|&&p| p).count(), 216 - 3);
    }

    #[test]
    fn test_empty_mask() {
        let m = Array3::from_elem((4, 4, 4), false);
        let labels = label_components(m.view()).unwrap();
        assert!(labels.is_empty());
        assert!(labels.largest().is_none());
    }

    #[test]
    fn test_non_standard_layout() {
        let m = mask_with(5, &[(0, 1, 4), (1, 2, 3), (4, 0, 0)]);
        let t = m.t();
        let labels = label_components(t).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.components()[0].first_voxel(), (0, 0, 4));
        assert_eq!(labels.label_at((3, 2, 1)), labels.label_at((4, 1, 0)));
    }
}
