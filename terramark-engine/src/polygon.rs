//! Mask-to-polygon conversion
//!
//! Finds the largest 8-connected foreground region of a binary mask and
//! traces its outer boundary into an ordered ring, dropping collinear
//! points so straight edges collapse to their corner vertices.

use terramark_core::mask::{Mask, Polygon};

/// Moore neighborhood in clockwise order starting west: W NW N NE E SE S SW
const NEIGHBORS: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// Trace the outer boundary of the largest foreground region.
///
/// Returns the ring in pixel coordinates, or `None` for an all-background
/// mask. The ring starts at the region's top-leftmost pixel and runs
/// clockwise in image coordinates.
pub fn trace_outline(mask: &Mask) -> Option<Polygon> {
    let (component, start) = largest_component(mask)?;
    let contour = moore_trace(&component, start);
    let ring = collapse_collinear(&contour);
    Some(
        ring.into_iter()
            .map(|(x, y)| [x as f64, y as f64])
            .collect(),
    )
}

/// Rescale a pixel-coordinate ring into [0,1] relative to the image size
pub fn normalize(ring: Polygon, width: u32, height: u32) -> Polygon {
    if width == 0 || height == 0 {
        return ring;
    }
    ring.into_iter()
        .map(|[x, y]| [x / width as f64, y / height as f64])
        .collect()
}

/// Extract the largest 8-connected foreground region and its top-leftmost
/// pixel (row-major scan order). Ties keep the first region found.
fn largest_component(mask: &Mask) -> Option<(Mask, (i64, i64))> {
    let width = mask.width();
    let height = mask.height();
    let mut visited = vec![false; (width as usize) * (height as usize)];
    let index = |x: u32, y: u32| (y as usize) * (width as usize) + (x as usize);

    let mut best: Option<Vec<(u32, u32)>> = None;
    for y in 0..height {
        for x in 0..width {
            if !mask.get(x, y) || visited[index(x, y)] {
                continue;
            }

            let mut pixels = Vec::new();
            let mut queue = std::collections::VecDeque::new();
            visited[index(x, y)] = true;
            queue.push_back((x, y));
            while let Some((px, py)) = queue.pop_front() {
                pixels.push((px, py));
                for (dx, dy) in NEIGHBORS {
                    let nx = px as i64 + dx;
                    let ny = py as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    if mask.get(nx, ny) && !visited[index(nx, ny)] {
                        visited[index(nx, ny)] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            if best.as_ref().map_or(true, |b| pixels.len() > b.len()) {
                best = Some(pixels);
            }
        }
    }

    let pixels = best?;
    let mut component = Mask::new(width, height);
    let mut start = pixels[0];
    for &(px, py) in &pixels {
        component.set(px, py, true);
        if (py, px) < (start.1, start.0) {
            start = (px, py);
        }
    }
    Some((component, (start.0 as i64, start.1 as i64)))
}

fn foreground(mask: &Mask, p: (i64, i64)) -> bool {
    p.0 >= 0 && p.1 >= 0 && mask.get(p.0 as u32, p.1 as u32)
}

fn neighbor_index(center: (i64, i64), neighbor: (i64, i64)) -> usize {
    NEIGHBORS
        .iter()
        .position(|(dx, dy)| (center.0 + dx, center.1 + dy) == neighbor)
        .unwrap_or(0)
}

/// Moore-neighbor boundary tracing, clockwise.
///
/// Stops when the start pixel is re-entered from its original backtrack, or
/// when the deterministic walk revisits its first post-start state (which
/// closes degenerate one-pixel-wide regions).
fn moore_trace(component: &Mask, start: (i64, i64)) -> Vec<(i64, i64)> {
    let initial_backtrack = (start.0 - 1, start.1);
    let mut contour = vec![start];
    let mut current = start;
    let mut backtrack = initial_backtrack;
    let mut first_state: Option<((i64, i64), (i64, i64))> = None;

    let cap = 4 * (component.width() as usize) * (component.height() as usize) + 8;
    for _ in 0..cap {
        let from_idx = neighbor_index(current, backtrack);
        let mut advanced = false;
        for step in 1..=8usize {
            let idx = (from_idx + step) % 8;
            let candidate = (current.0 + NEIGHBORS[idx].0, current.1 + NEIGHBORS[idx].1);
            if !foreground(component, candidate) {
                continue;
            }

            let prev_idx = (from_idx + step + 7) % 8;
            let new_backtrack = (current.0 + NEIGHBORS[prev_idx].0, current.1 + NEIGHBORS[prev_idx].1);

            if candidate == start && new_backtrack == initial_backtrack {
                return contour;
            }
            if first_state == Some((candidate, new_backtrack)) {
                if contour.last() == contour.first() && contour.len() > 1 {
                    contour.pop();
                }
                return contour;
            }
            if first_state.is_none() {
                first_state = Some((candidate, new_backtrack));
            }

            contour.push(candidate);
            current = candidate;
            backtrack = new_backtrack;
            advanced = true;
            break;
        }

        if !advanced {
            // Isolated pixel: no foreground neighbor at all
            return contour;
        }
    }
    contour
}

/// Drop ring points whose neighbors continue in the same direction, keeping
/// corners and reversal endpoints (one-pixel-wide runs) only.
fn collapse_collinear(contour: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = contour.len();
    if n < 3 {
        return contour.to_vec();
    }

    let mut corners = Vec::new();
    for i in 0..n {
        let prev = contour[(i + n - 1) % n];
        let here = contour[i];
        let next = contour[(i + 1) % n];
        let v1 = (here.0 - prev.0, here.1 - prev.1);
        let v2 = (next.0 - here.0, next.1 - here.1);
        let cross = v1.0 * v2.1 - v1.1 * v2.0;
        let dot = v1.0 * v2.0 + v1.1 * v2.1;
        if cross != 0 || dot <= 0 {
            corners.push(here);
        }
    }

    if corners.is_empty() {
        let mut dedup = contour.to_vec();
        dedup.dedup();
        if dedup.last() == dedup.first() && dedup.len() > 1 {
            dedup.pop();
        }
        return dedup;
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_mask(width: u32, height: u32, x0: u32, x1: u32, y0: u32, y1: u32) -> Mask {
        Mask::from_fn(width, height, |x, y| x >= x0 && x <= x1 && y >= y0 && y <= y1)
    }

    #[test]
    fn test_all_background_returns_none() {
        let mask = Mask::new(64, 48);
        assert!(trace_outline(&mask).is_none());
    }

    #[test]
    fn test_rectangle_collapses_to_four_corners() {
        // Foreground at rows 300-500, cols 400-600 of a 1024x768 image
        let mask = rect_mask(1024, 768, 400, 600, 300, 500);
        let ring = trace_outline(&mask).unwrap();
        assert_eq!(
            ring,
            vec![
                [400.0, 300.0],
                [600.0, 300.0],
                [600.0, 500.0],
                [400.0, 500.0],
            ]
        );
    }

    #[test]
    fn test_rectangle_touching_image_edge() {
        let mask = rect_mask(32, 32, 0, 9, 0, 4);
        let ring = trace_outline(&mask).unwrap();
        assert_eq!(
            ring,
            vec![[0.0, 0.0], [9.0, 0.0], [9.0, 4.0], [0.0, 4.0]]
        );
    }

    #[test]
    fn test_largest_region_wins() {
        let mut mask = rect_mask(64, 64, 10, 30, 10, 30);
        // A smaller, disjoint region further down
        for y in 40..44 {
            for x in 40..44 {
                mask.set(x, y, true);
            }
        }
        let ring = trace_outline(&mask).unwrap();
        assert_eq!(
            ring,
            vec![[10.0, 10.0], [30.0, 10.0], [30.0, 30.0], [10.0, 30.0]]
        );
    }

    #[test]
    fn test_single_pixel_region() {
        let mut mask = Mask::new(16, 16);
        mask.set(5, 7, true);
        let ring = trace_outline(&mask).unwrap();
        assert_eq!(ring, vec![[5.0, 7.0]]);
    }

    #[test]
    fn test_horizontal_line_region() {
        let mask = rect_mask(16, 16, 3, 8, 5, 5);
        let ring = trace_outline(&mask).unwrap();
        // A 1-pixel-tall run degenerates to its two endpoints
        assert_eq!(ring, vec![[3.0, 5.0], [8.0, 5.0]]);
    }

    #[test]
    fn test_l_shape_keeps_inner_corner() {
        let mask = Mask::from_fn(32, 32, |x, y| {
            (x >= 4 && x <= 20 && y >= 4 && y <= 10) || (x >= 4 && x <= 10 && y >= 4 && y <= 20)
        });
        let ring = trace_outline(&mask).unwrap();
        // Four outer corners plus the diagonal step around the inner corner
        assert_eq!(ring.len(), 7);
        assert!(ring.contains(&[11.0, 10.0]));
        assert!(ring.contains(&[10.0, 11.0]));
    }

    #[test]
    fn test_normalize_divides_by_dimensions() {
        let ring = vec![[400.0, 300.0], [600.0, 300.0], [600.0, 500.0], [400.0, 500.0]];
        let normalized = normalize(ring, 1024, 768);
        assert_eq!(normalized[0], [400.0 / 1024.0, 300.0 / 768.0]);
        assert_eq!(normalized[2], [600.0 / 1024.0, 500.0 / 768.0]);
    }

    #[test]
    fn test_normalize_zero_dims_is_identity() {
        let ring = vec![[1.0, 2.0]];
        assert_eq!(normalize(ring.clone(), 0, 10), ring);
    }
}
